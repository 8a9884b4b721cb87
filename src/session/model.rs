use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Lifecycle status of a meeting session.
///
/// The state machine follows this flow:
/// - Idle -> Recording (start)
/// - Recording -> Processing (stop, begin transcription)
/// - Recording -> Failed (mic disconnect)
/// - Recording -> Interrupted (app shutdown)
/// - Processing -> Completed (transcription success)
/// - Processing -> Failed (transcription failure)
/// - Failed | Completed | Interrupted -> Processing (retry transcription)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No active recording
    Idle,
    /// Audio capture in progress
    Recording,
    /// Recording stopped, transcription in flight
    Processing,
    /// Transcript produced
    Completed,
    /// Terminal failure, audio preserved, retryable
    Failed,
    /// Recording cut short by shutdown, audio preserved, retryable
    Interrupted,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Interrupted => "interrupted",
        }
    }

    /// Whether this status occupies the single active-session slot.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Recording | SessionStatus::Processing)
    }
}

/// Audio source selection for a session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    /// Capture microphone input only (default)
    MicrophoneOnly,
    /// Capture system audio only
    SystemOnly,
    /// Capture microphone and system audio mixed together
    Mixed,
}

impl Default for AudioSourceKind {
    fn default() -> Self {
        AudioSourceKind::MicrophoneOnly
    }
}

/// A meeting session with its metadata and file references.
///
/// Each session is stored in a dedicated folder under the data root:
/// `{data_root}/meetings/{id}/`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeetingSession {
    /// Unique identifier (UUID format), immutable
    pub id: String,

    /// User-editable title, defaults to a timestamp form like
    /// "Meeting - January 15, 2025 3:30 PM"
    pub title: String,

    /// Unix timestamp (seconds) when the session was created
    pub created_at: i64,

    /// Recording duration in seconds, set when recording stops or is
    /// interrupted. Never decreases once set.
    pub duration: Option<f64>,

    /// Current lifecycle status
    pub status: SessionStatus,

    /// Relative path to the audio file, e.g. "{id}/audio.wav". Set as soon
    /// as recording starts so a crash mid-recording still leaves a
    /// discoverable artifact.
    pub audio_path: Option<String>,

    /// Relative path to the transcript file, e.g. "{id}/transcript.txt"
    pub transcript_path: Option<String>,

    /// Error message if the session failed
    pub error_message: Option<String>,

    /// Audio source this session recorded from
    pub audio_source: AudioSourceKind,

    /// Relative path to a summary file written by a later pipeline stage
    pub summary_path: Option<String>,
}

impl MeetingSession {
    pub fn new(id: String, title: String, created_at: i64, audio_source: AudioSourceKind) -> Self {
        Self {
            id,
            title,
            created_at,
            duration: None,
            status: SessionStatus::Idle,
            audio_path: None,
            transcript_path: None,
            error_message: None,
            audio_source,
            summary_path: None,
        }
    }
}

/// Formats a Unix timestamp into the default session title.
pub fn default_title(created_at: i64) -> String {
    match DateTime::from_timestamp(created_at, 0) {
        Some(utc) => {
            let local = utc.with_timezone(&Local);
            format!(
                "Meeting - {}",
                local.format("%B %e, %Y %l:%M %p").to_string().trim()
            )
        }
        None => format!("Meeting {}", created_at),
    }
}

/// Validates that a lifecycle transition is in the state graph.
///
/// Any transition not listed is rejected and must leave persisted state
/// unchanged.
pub fn validate_transition(from: &SessionStatus, to: &SessionStatus) -> Result<(), SessionError> {
    use SessionStatus::*;

    match (from, to) {
        (Idle, Recording) => Ok(()),
        (Recording, Processing) => Ok(()),
        (Recording, Failed) => Ok(()),      // mic disconnect
        (Recording, Interrupted) => Ok(()), // app shutdown
        (Processing, Completed) => Ok(()),
        (Processing, Failed) => Ok(()),
        (Failed, Processing) => Ok(()),      // retry
        (Completed, Processing) => Ok(()),   // retry
        (Interrupted, Processing) => Ok(()), // retry

        _ => Err(SessionError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }),
    }
}
