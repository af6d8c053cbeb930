use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{dlq, handlers, middleware::metrics_middleware, orchestrator, runs};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Runs
        .route("/runs", get(runs::list_runs))
        .route("/runs/trigger", post(runs::trigger_run))
        .route("/runs/{id}", get(runs::get_run))
        // Dead-letter queue
        .route("/dlq", get(dlq::list_entries))
        .route("/dlq/process", post(dlq::process))
        .route("/dlq/{id}", get(dlq::get_entry))
        // Orchestrator, scheduler and DLQ processor
        .route("/orchestrator/status", get(orchestrator::get_status))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
