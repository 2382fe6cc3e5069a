//! Route Configuration
//!
//! Configures all HTTP routes for the control API.

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/session", session_routes())
        .nest("/listener", listener_routes())
        .nest("/stream", stream_routes())
}

/// Combined session routes
fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::session::get_status))
        .route("/start", post(handlers::session::start_session))
        .route("/stop", post(handlers::session::stop_session))
}

/// Listener routes
fn listener_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(handlers::session::start_listener))
        .route("/stop", post(handlers::session::stop_listener))
        .route("/rooms", post(handlers::session::attach_room))
}

/// Stream routes
fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(handlers::session::start_stream))
        .route("/stop", post(handlers::session::stop_stream))
}
