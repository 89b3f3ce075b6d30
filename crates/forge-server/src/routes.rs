//! Route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Job endpoints
        .nest("/v1", generation_routes())
        // Provider webhook endpoints
        .route("/webhooks/:provider", post(handlers::provider_webhook))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // Add state
        .with_state(state)
}

/// Generation job routes
fn generation_routes() -> Router<AppState> {
    Router::new()
        .route("/generations", post(handlers::create_generation))
        .route("/generations/:job_id", get(handlers::get_generation))
}
