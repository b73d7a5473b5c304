//! Cross-cutting request middleware: request-id tagging, session-based
//! auth, rate limiting, CORS, and structured request logging.
//!
//! One `tower`/`axum` layer per concern, composed in
//! `routes::build_router`. Auth is backed by
//! [`crate::session::SessionStore`] (C4) rather than bearer tokens — this
//! platform's identity mechanism is the shared session store (§2, §4.2).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::enterprise::ratelimit::{QuotaIdentifier, QuotaLimits, QuotaPeriod, RateLimiter, RateLimiterConfig};
use crate::error::AppError;
use crate::session::SessionStore;

use super::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SESSION_HEADER: &str = "x-session-id";
pub const FINGERPRINT_HEADER: &str = "x-client-fingerprint";

/// Stamps a request id (from the inbound header, or freshly minted) on
/// request extensions so every later layer and the error envelope can read
/// it without re-deriving it (§6 — every error response carries `requestId`).
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    req.extensions_mut().insert(request_id);
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Attaches the caller's identity by loading (and fingerprint-verifying)
/// the session named in `X-Session-Id`. Requests with no session header are
/// let through unauthenticated — handlers that require a principal reject
/// with `unauthorized` themselves; this layer's only job is to resolve and
/// validate the session once per request (§4.2, §8 "Session fingerprint").
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = *req.extensions().get::<Uuid>().unwrap_or(&Uuid::nil());

    if let Some(session_id) = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        let fingerprint = req
            .headers()
            .get(FINGERPRINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        match state.sessions.load_verified(&session_id, &fingerprint) {
            Ok(record) => {
                req.extensions_mut().insert(record);
            }
            Err(err) => {
                return err.with_request_id(request_id).into_response();
            }
        }
    }

    next.run(req).await
}

/// Per-client-IP request-rate gate backing the `rateLimited` (429) error
/// kind (§7), keyed by `X-Forwarded-For` via `crate::enterprise::ratelimit`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = *req.extensions().get::<Uuid>().unwrap_or(&Uuid::nil());
    let client_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let identifier = QuotaIdentifier::IpAddress(client_ip);
    match limiter.check(&identifier, "http_request", 1).await {
        Ok(result) if result.is_allowed() => next.run(req).await,
        Ok(result) => AppError::new(
            crate::error::ErrorKind::RateLimited,
            "request rate limit exceeded",
        )
        .with_request_id(request_id)
        .with_details(serde_json::json!({ "retryAfterSecs": result.retry_after().map(|d| d.as_secs()) }))
        .into_response(),
        Err(err) => AppError::internal(format!("rate limiter error: {err}"))
            .with_request_id(request_id)
            .into_response(),
    }
}

/// Builds the per-IP limiter used by [`rate_limit_middleware`], with a
/// default quota of 600 requests/min per client (§7 — the limiter itself
/// carries no opinion on the value; this is this platform's operational
/// default).
pub async fn default_rate_limiter() -> Arc<RateLimiter> {
    let limiter = RateLimiter::new(RateLimiterConfig::default());
    limiter
        .quota_manager()
        .set_default_limits("http_request".to_string(), QuotaLimits::new(600, QuotaPeriod::Minute))
        .await
        .expect("setting the default http_request quota cannot fail");
    Arc::new(limiter)
}

/// Permissive CORS for the out-of-scope browser client (§1 — the client is
/// an external collaborator; this API only needs to not block it).
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// A conservative fixed set of security headers; no per-route
/// customization is needed at this surface.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    response
}

/// Logs method/path/status/latency at `info` for slow repository queries'
/// sibling concern — cheap requests are `debug`, reserving `info` for
/// anything worth a human's attention.
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();
    if elapsed.as_millis() > 100 || status.is_server_error() {
        tracing::info!(%method, %path, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request");
    } else {
        tracing::debug!(%method, %path, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "request");
    }
    response
}

/// Production startup gate helper: non-development environments never echo
/// internals in error bodies (§7 — "no stack traces in non-development
/// modes"). `AppError`'s envelope is already opaque for `internal`; this
/// exists so any future verbose-in-dev debug payload has one obvious place
/// to check before it's added.
pub fn is_development(env: crate::config::RustEnv) -> bool {
    !env.is_production()
}

pub async fn not_found_fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "status": "error",
            "code": "notFound",
            "message": "no route matches this path",
        })),
    )
}
