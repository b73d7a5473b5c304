//! Router assembly: domain CRUD under `/api`, operational endpoints
//! outside the middleware stack that guards them (§6).

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower::ServiceBuilder;

use super::{handlers, middleware as mw, AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    let inspections = Router::new()
        .route("/", get(handlers::list_inspections).post(handlers::create_inspection))
        .route(
            "/:id",
            get(handlers::get_inspection).delete(handlers::delete_inspection),
        )
        .route("/:id/status", patch(handlers::transition_inspection))
        .route("/:id/items", post(handlers::add_inspection_item))
        .route("/:id/defects", post(handlers::add_inspection_defect));

    let components = Router::new()
        .route("/", get(handlers::list_components).post(handlers::create_component))
        .route(
            "/:id",
            get(handlers::get_component).delete(handlers::delete_component),
        )
        .route("/:id/revision", patch(handlers::revise_component))
        .route(
            "/:id/revision/status",
            patch(handlers::transition_component_revision),
        )
        .route("/:id/specifications", post(handlers::add_component_specification))
        .route("/:id/status", patch(handlers::transition_component));

    let customers = Router::new()
        .route("/", get(handlers::list_customers).post(handlers::create_customer))
        .route(
            "/:id",
            get(handlers::get_customer).delete(handlers::delete_customer),
        )
        .route("/:id/contact", patch(handlers::update_customer_contact))
        .route("/:id/deactivate", post(handlers::deactivate_customer));

    let api = Router::new()
        .nest("/inspections", inspections)
        .nest("/components", components)
        .nest("/customers", customers)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(mw::request_logging_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.rate_limiter.clone(),
                    mw::rate_limit_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    mw::session_middleware,
                ))
                .layer(axum::middleware::from_fn(mw::security_headers_middleware))
                .layer(mw::cors_layer()),
        );

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(mw::request_id_middleware))
        .fallback(mw::not_found_fallback)
        .with_state(state)
}
