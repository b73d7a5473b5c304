//! Per-identifier request-rate gate backing the `rateLimited` (429) error
//! kind (spec §7, §6 "Environment").
//!
//! A fixed-window counter per identifier+operation (`DashMap` usage table,
//! `RwLock`-guarded defaults), trimmed to what the platform actually needs:
//! this server has one caller
//! (`crate::api::middleware::rate_limit_middleware`, keyed by client IP)
//! and one policy (reject with a retry-after hint). A much larger
//! rate-limiting subsystem — distributed Redis coordination, quota
//! inheritance hierarchies, abuse-detection analytics, pluggable throttling
//! policies, multi-standard HTTP headers — had no counterpart anywhere here
//! and was dropped in the final trim (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised while configuring or checking a quota.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("no quota limits configured for operation: {0}")]
    Unconfigured(String),
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Identifies who a quota applies to. The platform only keys by client IP
/// today; the other variants exist so a future authenticated-quota path
/// (per-user limits) slots in without widening the API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaIdentifier {
    IpAddress(String),
    User(String),
    Custom(String),
}

impl QuotaIdentifier {
    fn to_key(&self) -> String {
        match self {
            Self::IpAddress(ip) => format!("ip:{ip}"),
            Self::User(id) => format!("user:{id}"),
            Self::Custom(key) => format!("custom:{key}"),
        }
    }
}

/// Window over which a [`QuotaLimits`] is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaPeriod {
    Second,
    Minute,
    Hour,
    Day,
}

impl QuotaPeriod {
    fn as_duration(self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3600),
            Self::Day => Duration::from_secs(86400),
        }
    }
}

/// Maximum request count allowed within a [`QuotaPeriod`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_requests: u64,
    pub period: QuotaPeriod,
}

impl QuotaLimits {
    pub fn new(max_requests: u64, period: QuotaPeriod) -> Self {
        Self { max_requests, period }
    }
}

/// Outcome of a single quota check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allowed { remaining: u64 },
    Denied { retry_after: Duration, limit: u64 },
}

/// Snapshot of current usage for an identifier+operation pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
}

/// Fixed-window counter: counts reset to zero at the end of each period.
/// Simpler than a sliding log and adequate for a 429 gate — there's no
/// precision requirement on the rate-limit algorithm itself, only on the
/// `rateLimited` outcome it produces.
struct WindowTracker {
    count: parking_lot::RwLock<u64>,
    window_start: parking_lot::RwLock<SystemTime>,
    period: QuotaPeriod,
    limit: u64,
}

impl WindowTracker {
    fn new(limit: u64, period: QuotaPeriod) -> Self {
        Self {
            count: parking_lot::RwLock::new(0),
            window_start: parking_lot::RwLock::new(SystemTime::now()),
            period,
            limit,
        }
    }

    fn reset_if_expired(&self) {
        let start = *self.window_start.read();
        if SystemTime::now()
            .duration_since(start)
            .unwrap_or(Duration::ZERO)
            >= self.period.as_duration()
        {
            *self.count.write() = 0;
            *self.window_start.write() = SystemTime::now();
        }
    }

    fn time_until_reset(&self) -> Duration {
        let start = *self.window_start.read();
        (start + self.period.as_duration())
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::from_secs(1))
    }

    fn check(&self, amount: u64) -> Decision {
        self.reset_if_expired();
        let mut count = self.count.write();
        if *count + amount <= self.limit {
            *count += amount;
            Decision::Allowed { remaining: self.limit - *count }
        } else {
            Decision::Denied {
                retry_after: self.time_until_reset(),
                limit: self.limit,
            }
        }
    }

    fn usage(&self) -> QuotaUsage {
        self.reset_if_expired();
        let current = *self.count.read();
        QuotaUsage {
            current,
            limit: self.limit,
            remaining: self.limit.saturating_sub(current),
        }
    }
}

/// Tracks and enforces per-operation quotas. One [`WindowTracker`] is
/// lazily created per `(identifier, operation)` pair on first use.
pub struct QuotaManager {
    trackers: DashMap<String, Arc<WindowTracker>>,
    default_limits: RwLock<HashMap<String, QuotaLimits>>,
}

impl QuotaManager {
    pub fn new() -> Self {
        Self {
            trackers: DashMap::new(),
            default_limits: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_default_limits(&self, operation: String, limits: QuotaLimits) -> RateLimitResult<()> {
        self.default_limits.write().await.insert(operation, limits);
        Ok(())
    }

    pub async fn check(&self, identifier: &QuotaIdentifier, operation: &str, amount: u64) -> RateLimitResult<Decision> {
        let key = format!("{}:{}", identifier.to_key(), operation);
        if let Some(tracker) = self.trackers.get(&key) {
            return Ok(tracker.check(amount));
        }

        let limits = self
            .default_limits
            .read()
            .await
            .get(operation)
            .cloned()
            .ok_or_else(|| RateLimitError::Unconfigured(operation.to_string()))?;

        let tracker = self
            .trackers
            .entry(key)
            .or_insert_with(|| Arc::new(WindowTracker::new(limits.max_requests, limits.period)))
            .clone();
        Ok(tracker.check(amount))
    }

    pub async fn get_usage(&self, identifier: &QuotaIdentifier, operation: &str) -> Option<QuotaUsage> {
        let key = format!("{}:{}", identifier.to_key(), operation);
        self.trackers.get(&key).map(|t| t.usage())
    }

    pub async fn reset(&self, identifier: &QuotaIdentifier, operation: Option<&str>) {
        match operation {
            Some(op) => {
                self.trackers.remove(&format!("{}:{}", identifier.to_key(), op));
            }
            None => {
                let prefix = identifier.to_key();
                self.trackers.retain(|k, _| !k.starts_with(&prefix));
            }
        }
    }
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of [`RateLimiter::check`]: the raw [`Decision`] plus the
/// allow/deny verdict the HTTP layer acts on directly.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub decision: Decision,
}

impl CheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, Decision::Allowed { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self.decision {
            Decision::Denied { retry_after, .. } => Some(retry_after),
            Decision::Allowed { .. } => None,
        }
    }
}

/// Configuration for [`RateLimiter::new`]. Kept as its own type (rather
/// than folding directly into `RateLimiter`) so callers can construct one
/// with `..Default::default()` as new knobs are added.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterConfig {}

/// Thin façade the HTTP middleware depends on; everything is delegated to
/// [`QuotaManager`]. Separated from it only so the transport layer has a
/// stable type to hold in `AppState` independent of the quota internals.
pub struct RateLimiter {
    quota_manager: Arc<QuotaManager>,
}

impl RateLimiter {
    pub fn new(_config: RateLimiterConfig) -> Self {
        Self {
            quota_manager: Arc::new(QuotaManager::new()),
        }
    }

    pub fn quota_manager(&self) -> Arc<QuotaManager> {
        self.quota_manager.clone()
    }

    pub async fn check(
        &self,
        identifier: &QuotaIdentifier,
        operation: &str,
        amount: u64,
    ) -> RateLimitResult<CheckResult> {
        let decision = self.quota_manager.check(identifier, operation, amount).await?;
        Ok(CheckResult { decision })
    }

    pub async fn reset(&self, identifier: &QuotaIdentifier, operation: Option<&str>) {
        self.quota_manager.reset(identifier, operation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter
            .quota_manager()
            .set_default_limits("http_request".to_string(), QuotaLimits::new(5, QuotaPeriod::Minute))
            .await
            .unwrap();

        let id = QuotaIdentifier::IpAddress("203.0.113.7".to_string());
        for _ in 0..5 {
            let result = limiter.check(&id, "http_request", 1).await.unwrap();
            assert!(result.is_allowed());
        }
    }

    #[tokio::test]
    async fn denies_once_limit_exceeded_and_reports_retry_after() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter
            .quota_manager()
            .set_default_limits("http_request".to_string(), QuotaLimits::new(2, QuotaPeriod::Minute))
            .await
            .unwrap();

        let id = QuotaIdentifier::IpAddress("203.0.113.8".to_string());
        assert!(limiter.check(&id, "http_request", 1).await.unwrap().is_allowed());
        assert!(limiter.check(&id, "http_request", 1).await.unwrap().is_allowed());

        let denied = limiter.check(&id, "http_request", 1).await.unwrap();
        assert!(!denied.is_allowed());
        assert!(denied.retry_after().is_some());
    }

    #[tokio::test]
    async fn quotas_are_isolated_per_identifier() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter
            .quota_manager()
            .set_default_limits("http_request".to_string(), QuotaLimits::new(1, QuotaPeriod::Minute))
            .await
            .unwrap();

        let a = QuotaIdentifier::IpAddress("10.0.0.1".to_string());
        let b = QuotaIdentifier::IpAddress("10.0.0.2".to_string());

        assert!(limiter.check(&a, "http_request", 1).await.unwrap().is_allowed());
        assert!(!limiter.check(&a, "http_request", 1).await.unwrap().is_allowed());
        assert!(limiter.check(&b, "http_request", 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn reset_clears_accumulated_usage() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        limiter
            .quota_manager()
            .set_default_limits("http_request".to_string(), QuotaLimits::new(1, QuotaPeriod::Minute))
            .await
            .unwrap();

        let id = QuotaIdentifier::IpAddress("198.51.100.1".to_string());
        assert!(limiter.check(&id, "http_request", 1).await.unwrap().is_allowed());
        assert!(!limiter.check(&id, "http_request", 1).await.unwrap().is_allowed());

        limiter.reset(&id, Some("http_request")).await;
        assert!(limiter.check(&id, "http_request", 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn unconfigured_operation_is_an_error() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let id = QuotaIdentifier::IpAddress("192.0.2.1".to_string());
        let err = limiter.check(&id, "unknown_op", 1).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Unconfigured(_)));
    }
}
