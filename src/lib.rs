pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod recovery;
pub mod session;
pub mod store;
pub mod transcription;

pub use audio::{
    CaptureBackend, CaptureConfig, CaptureFactory, DefaultCaptureFactory, WavWriterHandle,
};
pub use config::Config;
pub use error::{SessionError, StorageError};
pub use http::{create_router, AppState};
pub use recovery::ErrorRecoveryCoordinator;
pub use session::{
    AudioSourceKind, EventBus, MeetingSession, SessionEvent, SessionEventKind, SessionManager,
    SessionStatus,
};
pub use store::SessionStore;
pub use transcription::{TranscriptionBridge, WhisperCliBridge};
