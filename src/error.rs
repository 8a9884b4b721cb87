//! Error types for the session manager.

use thiserror::Error;

/// Errors surfaced by session commands.
///
/// Capture and encoder failures mid-recording are not represented here;
/// they are recovered into a persisted `Failed`/`Interrupted` transition
/// with an `error_message` on the session record. Only rejected commands
/// and programmer-error conditions reach the caller as `SessionError`.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Start was requested while another session occupies Recording/Processing.
    #[error("another session is already active ({status})")]
    AlreadyActive { status: String },

    /// The capture adapter could not open the requested source.
    #[error("audio source unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// The audio stream reported an error mid-recording.
    #[error("audio stream lost: {message}")]
    MicDisconnected { message: String },

    /// WAV finalize exceeded its deadline. Bytes flushed before the
    /// timeout remain valid on disk.
    #[error("WAV finalize timed out after {timeout_ms}ms; partial audio saved")]
    FinalizeTimeout { timeout_ms: u64 },

    /// The transcription bridge reported failure. Retryable without
    /// re-recording.
    #[error("transcription failed: {message}")]
    TranscriptionFailed { message: String },

    /// Filesystem or record write failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Unknown session id.
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// The requested lifecycle transition is not in the state graph.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Command-level validation failure (empty title, missing audio path).
    #[error("{0}")]
    Invalid(String),
}

/// Persistence-layer failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk session record does not parse. Treated as a hard
    /// error rather than silently skipped.
    #[error("corrupt session record at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_active_display() {
        let err = SessionError::AlreadyActive {
            status: "recording".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "another session is already active (recording)"
        );
    }

    #[test]
    fn test_finalize_timeout_display() {
        let err = SessionError::FinalizeTimeout { timeout_ms: 5000 };
        assert_eq!(
            err.to_string(),
            "WAV finalize timed out after 5000ms; partial audio saved"
        );
    }

    #[test]
    fn test_storage_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SessionError = StorageError::from(io_err).into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SessionError>();
        assert_sync::<SessionError>();
    }
}
