//! Session lifecycle management
//!
//! This module is the lifecycle authority for meeting sessions:
//! - `SessionManager` drives every state transition behind one mutex
//! - the session record, status graph, and audio source selection
//! - the event bus carrying full session records to the UI layer

mod events;
mod manager;
mod model;

pub use events::{EventBus, SessionEvent, SessionEventKind};
pub use manager::SessionManager;
pub use model::{
    default_title, validate_transition, AudioSourceKind, MeetingSession, SessionStatus,
};
