//! Startup configuration, assembled once from the environment (§6).
//!
//! Every field has an explicit default so local/dev runs work without a
//! `.env` file, but production deployments are expected to set all of it
//! explicitly.

use std::env;
use std::time::Duration;

/// Runtime environment, gates the HealthProbe startup check and stack-trace
/// suppression in error responses (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RustEnv {
    Development,
    Production,
    Test,
}

impl RustEnv {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => RustEnv::Production,
            "test" => RustEnv::Test,
            _ => RustEnv::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, RustEnv::Production)
    }
}

/// Auto-scaling thresholds, sourced entirely from env vars per §6/§9 (no
/// mandated defaults beyond the illustrative values used here for local
/// runs).
#[derive(Debug, Clone)]
pub struct AutoScaleConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub upper_rps: f64,
    pub lower_rps: f64,
    pub upper_p95_ms: f64,
    pub lower_p95_ms: f64,
    pub sample_interval: Duration,
    pub sustain_duration: Duration,
    pub cool_down: Duration,
}

impl Default for AutoScaleConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 8,
            upper_rps: 500.0,
            lower_rps: 100.0,
            upper_p95_ms: 400.0,
            lower_p95_ms: 150.0,
            sample_interval: Duration::from_secs(10),
            sustain_duration: Duration::from_secs(30),
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Top-level platform configuration, parsed once in `main.rs` and handed
/// down through the dependency graph (`AppState`).
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub env: RustEnv,
    pub port: u16,
    pub worker_count: usize,
    pub db_url: String,
    pub cache_url: Option<String>,
    pub session_ttl: Duration,
    pub session_idle: Duration,
    pub autoscale: AutoScaleConfig,
    pub drift_method_default: String,
    pub log_format: LogFormat,
    pub log_level: String,
    pub drain_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl PlatformConfig {
    /// Load configuration from the process environment. Never panics on a
    /// missing var — each has a development-friendly fallback; only
    /// malformed values (non-numeric counts, etc.) are rejected.
    pub fn from_env() -> anyhow::Result<Self> {
        let env = RustEnv::from_str(&env::var("RUST_ENV").unwrap_or_default());

        let port = env_parse("PORT", 8080)?;
        let worker_count = env_parse(
            "WORKER_COUNT",
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(1),
        )?;

        let db_url =
            env::var("DB_URL").unwrap_or_else(|_| "postgres://localhost/aerosuite".to_string());
        let cache_url = env::var("CACHE_URL").ok();

        let session_ttl = Duration::from_secs(env_parse("SESSION_TTL_SEC", 3600)?);
        let session_idle = Duration::from_secs(env_parse("SESSION_IDLE_SEC", 900)?);

        let autoscale = AutoScaleConfig {
            min_workers: env_parse("AUTOSCALE_MIN", 1)?,
            max_workers: env_parse("AUTOSCALE_MAX", 8)?,
            upper_rps: env_parse("AUTOSCALE_UPPER_RPS", 500.0)?,
            lower_rps: env_parse("AUTOSCALE_LOWER_RPS", 100.0)?,
            upper_p95_ms: env_parse("AUTOSCALE_UPPER_P95_MS", 400.0)?,
            lower_p95_ms: env_parse("AUTOSCALE_LOWER_P95_MS", 150.0)?,
            ..AutoScaleConfig::default()
        };

        let drift_method_default =
            env::var("DRIFT_METHOD_DEFAULT").unwrap_or_else(|_| "psi".to_string());

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            env,
            port,
            worker_count,
            db_url,
            cache_url,
            session_ttl,
            session_idle,
            autoscale,
            drift_method_default,
            log_format,
            log_level,
            drain_timeout: Duration::from_secs(10),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_env_defaults_to_development() {
        assert_eq!(RustEnv::from_str(""), RustEnv::Development);
        assert!(!RustEnv::from_str("").is_production());
    }

    #[test]
    fn rust_env_recognizes_production() {
        assert!(RustEnv::from_str("production").is_production());
        assert!(RustEnv::from_str("prod").is_production());
    }
}
