//! AeroSuite server entrypoint.
//!
//! One binary plays both roles of the cluster (§9): started with no
//! `CLUSTER_ROLE` env var it is the master — it builds a [`ClusterSupervisor`]
//! that re-execs this same binary as worker processes and does no request
//! handling itself. Started with `CLUSTER_ROLE=worker` (which the supervisor
//! sets on every child it forks) it assembles [`AppState`] and serves HTTP
//! directly.

use std::env;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use aerosuite_platform::api::{self, middleware, AppState};
use aerosuite_platform::autoscale::AutoScalingController;
use aerosuite_platform::cache::CacheEngine;
use aerosuite_platform::cluster::ClusterSupervisor;
use aerosuite_platform::config::{LogFormat, PlatformConfig};
use aerosuite_platform::database::{self, Database};
use aerosuite_platform::domain::repository::{CachedRepository, InMemoryRepository};
use aerosuite_platform::domain::services::{ComponentService, CustomerService, InspectionService};
use aerosuite_platform::events::EventBus;
use aerosuite_platform::health::{BackupAgeCheck, CacheCheck, DatabaseCheck, DiskFreeCheck, HealthProbe};
use aerosuite_platform::ml::{DriftDetector, InferenceRuntime, ModelRegistry, PerformanceTracker, StubLoader};
use aerosuite_platform::session::SessionStore;
use aerosuite_platform::workerpool::WorkerPool;

const CLUSTER_ROLE_ENV: &str = "CLUSTER_ROLE";
const WORKER_ROLE: &str = "worker";
const EVENT_BUS_CAPACITY: usize = 1024;

fn init_tracing(config: &PlatformConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn build_state(config: PlatformConfig) -> anyhow::Result<Arc<AppState>> {
    let cache = Arc::new(CacheEngine::new());
    let events: Arc<EventBus> = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));

    let customer_repo = Arc::new(CachedRepository::new(
        Arc::new(InMemoryRepository::new()),
        (*cache).clone(),
        "customers",
    ));
    let component_repo = Arc::new(CachedRepository::new(
        Arc::new(InMemoryRepository::new()),
        (*cache).clone(),
        "components",
    ));

    let inspections = Arc::new(InspectionService::new(
        Arc::new(CachedRepository::new(
            Arc::new(InMemoryRepository::new()),
            (*cache).clone(),
            "inspections",
        )),
        customer_repo.clone(),
        component_repo.clone(),
        events.clone(),
    ));
    let components = Arc::new(ComponentService::new(component_repo, events.clone()));
    let customers = Arc::new(CustomerService::new(customer_repo, events.clone()));

    let sessions = Arc::new(SessionStore::new(config.session_ttl, config.session_idle));
    let worker_pool = Arc::new(WorkerPool::new(config.worker_count.max(1), 256));
    let autoscaler = Arc::new(tokio::sync::Mutex::new(AutoScalingController::new(config.autoscale.clone())));
    let rate_limiter = middleware::default_rate_limiter().await;

    let model_registry = Arc::new(ModelRegistry::new());
    let inference = Arc::new(InferenceRuntime::new(Arc::new(StubLoader)));
    let performance = Arc::new(PerformanceTracker::new());
    let drift = Arc::new(DriftDetector::new());

    let db_config = database::Config {
        primary_url: config.db_url.clone(),
        pool_config: database::DatabaseConfig { url: config.db_url.clone(), ..database::DatabaseConfig::default() },
        ..database::Config::default()
    };
    let db = Database::new(db_config).await;
    let db_ok = Arc::new(AtomicBool::new(db.is_ok()));

    let health = {
        let backup_seen: Arc<parking_lot::RwLock<Option<chrono::DateTime<chrono::Utc>>>> =
            Arc::new(parking_lot::RwLock::new(Some(chrono::Utc::now())));
        let db_ok_for_check = db_ok.clone();
        Arc::new(HealthProbe::new(vec![
            Box::new(DatabaseCheck {
                ping: move || {
                    let ok = db_ok_for_check.load(std::sync::atomic::Ordering::Relaxed);
                    Box::pin(async move {
                        if ok {
                            Ok(())
                        } else {
                            Err("database unavailable at startup".to_string())
                        }
                    })
                },
            }),
            Box::new(CacheCheck { cache: (*cache).clone() }),
            Box::new(DiskFreeCheck {
                path: std::path::PathBuf::from("."),
                min_free_bytes: 100 * 1024 * 1024,
            }),
            Box::new(BackupAgeCheck {
                last_backup_at: backup_seen,
                max_age: chrono::Duration::hours(24),
            }),
        ]))
    };

    if config.env.is_production() {
        if let Err(err) = db {
            anyhow::bail!("database startup check failed in production: {err}");
        }
    }

    Ok(Arc::new(AppState {
        config,
        started_at: Instant::now(),
        inspections,
        components,
        customers,
        cache,
        sessions,
        worker_pool,
        autoscaler,
        health,
        rate_limiter,
        model_registry,
        inference,
        performance,
        drift,
    }))
}

async fn run_worker(config: PlatformConfig) -> anyhow::Result<()> {
    let port = config.port;
    let state = build_state(config).await?;
    let router = api::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "worker listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_master(config: PlatformConfig) -> anyhow::Result<()> {
    let binary_path = env::current_exe()?;
    let supervisor = Arc::new(ClusterSupervisor::new(
        binary_path,
        Vec::new(),
        config.worker_count.max(1),
        config.drain_timeout,
    ));

    supervisor.start().await?;
    tracing::info!(workers = supervisor.worker_count(), "master started worker pool");

    let supervise_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.supervise_forever().await })
    };

    shutdown_signal().await;
    supervisor.graceful_shutdown().await;
    supervise_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = match PlatformConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return std::process::ExitCode::from(1);
        }
    };

    init_tracing(&config);

    let is_worker = env::var(CLUSTER_ROLE_ENV).as_deref() == Ok(WORKER_ROLE);
    let result = if is_worker { run_worker(config).await } else { run_master(config).await };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            std::process::ExitCode::from(1)
        }
    }
}
