//! # AeroSuite Server Platform
//!
//! A clustered API host for aerospace-supplier quality records: inspections,
//! components, and customers, backed by a distributed session store, a
//! multi-tier tagged cache, a CPU-bound worker pool, and an ML serving core
//! for inspection-outcome models.
//!
//! ## Architecture
//!
//! - `config`: environment-driven platform configuration
//! - `error`: unified error taxonomy and HTTP/JSON mapping
//! - `events`: in-process domain event bus
//! - `health`: aggregated readiness/liveness checks
//! - `cache`: multi-tier tagged cache engine
//! - `session`: distributed session store
//! - `workerpool`: bounded CPU-bound job pool
//! - `autoscale`: scale-intent controller
//! - `cluster`: multi-process cluster supervisor
//! - `database`: connection pool, migrations, backup
//! - `domain`: aggregates, repositories, and domain services
//! - `ml`: model registry, inference runtime, performance tracking, drift detection
//! - `enterprise`: ambient cross-cutting concerns (rate limiting)
//! - `api`: HTTP surface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod autoscale;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod database;
pub mod domain;
pub mod enterprise;
pub mod error;
pub mod events;
pub mod health;
pub mod ml;
pub mod session;
pub mod workerpool;

pub use api::AppState;
pub use error::{AppError, AppResult};

/// Crate version, surfaced in `/health/detailed` and process logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, surfaced in process logs.
pub const NAME: &str = env!("CARGO_PKG_NAME");
