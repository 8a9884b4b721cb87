//! HTTP API server for the UI layer
//!
//! This module exposes the session command surface over REST:
//! - POST /sessions/start - Start a new recording
//! - POST /sessions/stop - Stop the active recording
//! - POST /sessions/:id/retry - Retry transcription
//! - PATCH /sessions/:id/title - Rename a session
//! - GET /sessions/current - The active session, if any
//! - GET /sessions - All sessions
//! - DELETE /sessions/:id - Delete a session and its files
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
