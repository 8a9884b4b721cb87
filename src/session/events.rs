use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::model::MeetingSession;

/// Lifecycle event kinds published to the UI layer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    SessionStarted,
    SessionStopped,
    SessionProcessing,
    SessionCompleted,
    SessionFailed,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::SessionStarted => "session_started",
            SessionEventKind::SessionStopped => "session_stopped",
            SessionEventKind::SessionProcessing => "session_processing",
            SessionEventKind::SessionCompleted => "session_completed",
            SessionEventKind::SessionFailed => "session_failed",
        }
    }
}

/// A lifecycle event carrying the full session record at the time of the
/// transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: MeetingSession,
}

/// In-process publish/subscribe bus for session events.
///
/// Subscribers that lag simply miss events; durable truth lives in the
/// session store, the bus is a UI signal only.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. A send with no subscribers is not an error.
    pub fn publish(&self, kind: SessionEventKind, session: &MeetingSession) {
        debug!("Emitting {} for session {}", kind.as_str(), session.id);

        let _ = self.tx.send(SessionEvent {
            kind,
            session: session.clone(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::AudioSourceKind;

    fn sample_session() -> MeetingSession {
        MeetingSession::new(
            "evt-test".to_string(),
            "Event test".to_string(),
            1705340400,
            AudioSourceKind::default(),
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SessionEventKind::SessionStarted, &sample_session());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::SessionStarted);
        assert_eq!(event.session.id, "evt-test");
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(SessionEventKind::SessionFailed, &sample_session());
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(SessionEventKind::SessionStarted.as_str(), "session_started");
        assert_eq!(
            serde_json::to_string(&SessionEventKind::SessionProcessing).unwrap(),
            "\"session_processing\""
        );
    }
}
