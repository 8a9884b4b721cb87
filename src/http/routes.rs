use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/sessions/start", post(handlers::start_recording))
        .route("/sessions/stop", post(handlers::stop_recording))
        .route("/sessions/:id/retry", post(handlers::retry_transcription))
        // Metadata
        .route("/sessions/:id/title", patch(handlers::update_title))
        // Queries
        .route("/sessions/current", get(handlers::get_current))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:id", delete(handlers::delete_session))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
