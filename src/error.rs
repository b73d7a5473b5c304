//! Unified error taxonomy for the AeroSuite server platform.
//!
//! Every subsystem raises an [`AppError`]; the transport layer is the single
//! place that maps a `kind()` onto an HTTP status and builds the JSON error
//! envelope. Domain and service layers should prefer the `*_with` helpers so
//! the `requestId` stays attachable without threading it through call sites.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Stable error categories from spec §7. Transport mapping lives in
/// [`ErrorKind::status_code`]; nothing else should hardcode a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    RateLimited,
    DependencyUnavailable,
    Timeout,
    Cancelled,
    ModelUnhealthy,
    QueueFull,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to. `dependencyUnavailable` is usually 503
    /// but may be served degraded by the caller before it ever becomes an
    /// `AppError` (see `CacheEngine::degraded`).
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap(),
            ErrorKind::ModelUnhealthy => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "notFound",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RateLimited => "rateLimited",
            ErrorKind::DependencyUnavailable => "dependencyUnavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ModelUnhealthy => "modelUnhealthy",
            ErrorKind::QueueFull => "queueFull",
            ErrorKind::Internal => "internal",
        }
    }
}

/// The platform-wide error type. Every public operation in the crate returns
/// `Result<T, AppError>` or a type alias of it.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach a request id, propagated by the request-id middleware.
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether this error is safe to retry automatically for an idempotent
    /// read per §7 ("Retries are performed only for dependencyUnavailable on
    /// idempotent reads").
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::DependencyUnavailable)
    }
}

/// Result alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    code: &'static str,
    message: String,
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.unwrap_or_else(Uuid::nil).to_string();
        let envelope = ErrorEnvelope {
            status: "error",
            code: self.kind.code_str(),
            message: self.message,
            request_id,
            details: self.details,
        };
        (self.kind.status_code(), Json(envelope)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::not_found("entity not found"),
            other => AppError::dependency_unavailable(format!("database error: {other}")),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::validation(format!("malformed json: {err}"))
    }
}
