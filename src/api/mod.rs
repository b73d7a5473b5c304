//! HTTP surface (§6): domain CRUD for inspections/components/customers,
//! health/metrics, and the dependency graph (`AppState`) every handler reads
//! from.
//!
//! `routes`/`handlers`/`middleware`/`responses` split, pointed at this
//! platform's domain. An API gateway layer (circuit breaker/retry/load
//! balancing) and a webhook subsystem had no counterpart here — §1
//! explicitly calls out webhook signature verification as external
//! plumbing — and were dropped in the final trim (see DESIGN.md).

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use crate::autoscale::AutoScalingController;
use crate::cache::CacheEngine;
use crate::config::PlatformConfig;
use crate::domain::services::{ComponentService, CustomerService, InspectionService};
use crate::enterprise::ratelimit::RateLimiter;
use crate::health::HealthProbe;
use crate::ml::{DriftDetector, InferenceRuntime, ModelRegistry, PerformanceTracker};
use crate::session::SessionStore;
use crate::workerpool::WorkerPool;

/// Everything a handler needs, assembled once in `main.rs` and shared
/// behind `Arc` across every worker task (§9: dependency injection replaces
/// `getInstance()`-style singletons).
pub struct AppState {
    pub config: PlatformConfig,
    pub started_at: Instant,

    pub inspections: Arc<InspectionService>,
    pub components: Arc<ComponentService>,
    pub customers: Arc<CustomerService>,

    pub cache: Arc<CacheEngine>,
    pub sessions: Arc<SessionStore>,
    pub worker_pool: Arc<WorkerPool>,
    pub autoscaler: Arc<tokio::sync::Mutex<AutoScalingController>>,
    pub health: Arc<HealthProbe>,
    pub rate_limiter: Arc<RateLimiter>,

    pub model_registry: Arc<ModelRegistry>,
    pub inference: Arc<InferenceRuntime>,
    pub performance: Arc<PerformanceTracker>,
    pub drift: Arc<DriftDetector>,
}

pub use routes::build_router;
