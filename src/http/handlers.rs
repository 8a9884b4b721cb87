use super::state::AppState;
use crate::error::SessionError;
use crate::session::AudioSourceKind;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct StartRecordingRequest {
    /// Audio source to capture (defaults to microphone only)
    #[serde(default)]
    pub audio_source: Option<AudioSourceKind>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map the session error taxonomy to HTTP status codes.
fn error_response(err: SessionError) -> axum::response::Response {
    let status = match &err {
        SessionError::AlreadyActive { .. } => StatusCode::CONFLICT,
        SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        SessionError::Invalid(_) => StatusCode::BAD_REQUEST,
        SessionError::DeviceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start recording a new session
pub async fn start_recording(
    State(state): State<AppState>,
    body: Option<Json<StartRecordingRequest>>,
) -> impl IntoResponse {
    let source = body
        .and_then(|Json(req)| req.audio_source)
        .unwrap_or_default();

    info!("Start requested (source: {:?})", source);

    match state.manager.start_recording(source).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /sessions/stop
/// Stop the active recording and kick off transcription
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested");

    match state.manager.stop_recording().await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /sessions/:id/retry
/// Re-run transcription on an existing recording
pub async fn retry_transcription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("Retry requested for session {}", id);

    match state.manager.retry_transcription(&id).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => error_response(e),
    }
}

/// PATCH /sessions/:id/title
/// Rename a session (valid in any state)
pub async fn update_title(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTitleRequest>,
) -> impl IntoResponse {
    match state.manager.update_title(&id, &req.title).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /sessions/current
/// The session currently owned by the manager, if any
pub async fn get_current(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.manager.get_current().await;
    (StatusCode::OK, Json(current)).into_response()
}

/// GET /sessions
/// All persisted sessions (history display orders them client-side)
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.list() {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /sessions/:id
/// Remove a session record and its directory tree
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!("Delete requested for session {}", id);

    match state.manager.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
