// Integration tests for the session state machine.
//
// A scripted capture factory stands in for the audio device: tests grab
// the registered callbacks and play the producer role themselves, so
// sample delivery, stream errors, and command timing are all under test
// control.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use huddle::audio::{
    CaptureBackend, CaptureConfig, CaptureFactory, ErrorCallback, SampleCallback,
};
use huddle::config::RecordingConfig;
use huddle::session::{SessionEvent, SessionEventKind};
use huddle::transcription::TranscriptionBridge;
use huddle::{
    AudioSourceKind, MeetingSession, SessionError, SessionManager, SessionStatus, SessionStore,
};
use tempfile::TempDir;

// ============================================================================
// Scripted collaborators
// ============================================================================

type CallbackSlot = Arc<Mutex<Option<(SampleCallback, ErrorCallback)>>>;

/// Capture factory whose backends hand their callbacks to the test.
struct ScriptedFactory {
    slot: CallbackSlot,
}

struct ScriptedBackend {
    slot: CallbackSlot,
    capturing: bool,
}

impl CaptureFactory for ScriptedFactory {
    fn create(
        &self,
        _source: &AudioSourceKind,
        _config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, SessionError> {
        Ok(Box::new(ScriptedBackend {
            slot: Arc::clone(&self.slot),
            capturing: false,
        }))
    }
}

impl CaptureBackend for ScriptedBackend {
    fn start(
        &mut self,
        on_samples: SampleCallback,
        on_error: ErrorCallback,
    ) -> Result<(), SessionError> {
        *self.slot.lock().unwrap() = Some((on_samples, on_error));
        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Bridge that always returns the same outcome.
struct StaticBridge(Result<String, String>);

#[async_trait::async_trait]
impl TranscriptionBridge for StaticBridge {
    async fn transcribe(&self, _audio_path: &Path) -> anyhow::Result<String> {
        match &self.0 {
            Ok(text) => Ok(text.clone()),
            Err(msg) => Err(anyhow::anyhow!("{}", msg)),
        }
    }
}

/// Bridge that fails a fixed number of times, then succeeds.
struct FlakyBridge {
    failures_left: AtomicUsize,
    text: String,
}

#[async_trait::async_trait]
impl TranscriptionBridge for FlakyBridge {
    async fn transcribe(&self, _audio_path: &Path) -> anyhow::Result<String> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("engine unavailable");
        }
        Ok(self.text.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    manager: Arc<SessionManager>,
    slot: CallbackSlot,
    _data_root: TempDir,
}

fn harness(bridge: Arc<dyn TranscriptionBridge>) -> Harness {
    let data_root = TempDir::new().unwrap();
    let store = SessionStore::open(data_root.path()).unwrap();

    let slot: CallbackSlot = Arc::new(Mutex::new(None));
    let factory = Arc::new(ScriptedFactory {
        slot: Arc::clone(&slot),
    });

    let (error_tx, error_rx) = mpsc::unbounded_channel();

    let manager = SessionManager::new(
        store,
        bridge,
        factory,
        CaptureConfig::default(),
        RecordingConfig::default(),
        error_tx,
    );

    let coordinator = huddle::ErrorRecoveryCoordinator::new(Arc::clone(&manager));
    coordinator.spawn_error_listener(error_rx);

    Harness {
        manager,
        slot,
        _data_root: data_root,
    }
}

impl Harness {
    fn callbacks(&self) -> (SampleCallback, ErrorCallback) {
        self.slot
            .lock()
            .unwrap()
            .clone()
            .expect("capture not started")
    }

    fn push_samples(&self, block: &[f32]) {
        let (on_samples, _) = self.callbacks();
        on_samples(block);
    }

    fn push_error(&self, message: &str) {
        let (_, on_error) = self.callbacks();
        on_error(message.to_string());
    }

    async fn wait_for_status(&self, id: &str, want: SessionStatus) -> MeetingSession {
        for _ in 0..200 {
            if let Some(session) = self.manager.get(id).unwrap() {
                if session.status == want {
                    return session;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {:?}", id, want);
    }
}

async fn next_event(
    rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_record_stop_transcribe_happy_path() {
    let h = harness(Arc::new(StaticBridge(Ok("hello from the meeting".to_string()))));
    let mut events = h.manager.events().subscribe();

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Recording);
    assert_eq!(
        session.audio_path.as_deref(),
        Some(format!("{}/audio.wav", session.id).as_str())
    );

    // The row is durable before start returns
    let on_disk = h.manager.get(&session.id).unwrap().unwrap();
    assert_eq!(on_disk.status, SessionStatus::Recording);

    // ~300ms of audio: 3 blocks of 1600 mono samples at 16kHz
    let block = vec![0.2f32; 1600];
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.push_samples(&block);
    }

    let stopped = h.manager.stop_recording().await.unwrap();
    assert_eq!(stopped.status, SessionStatus::Processing);

    let duration = stopped.duration.expect("duration set on stop");
    assert!(
        (0.25..0.6).contains(&duration),
        "expected ~0.3s, got {}",
        duration
    );

    // Finalized container: 44-byte header + 2 bytes per sample
    let audio_file = h
        .manager
        .store()
        .resolve(session.audio_path.as_deref().unwrap());
    assert_eq!(std::fs::metadata(&audio_file).unwrap().len(), 44 + 2 * 4800);

    let completed = h.wait_for_status(&session.id, SessionStatus::Completed).await;
    let transcript_rel = completed.transcript_path.expect("transcript path set");
    let transcript = std::fs::read_to_string(h.manager.store().resolve(&transcript_rel)).unwrap();
    assert_eq!(transcript, "hello from the meeting");

    // Full event sequence, each carrying the session record
    assert_eq!(next_event(&mut events).await.kind, SessionEventKind::SessionStarted);
    assert_eq!(next_event(&mut events).await.kind, SessionEventKind::SessionStopped);
    assert_eq!(next_event(&mut events).await.kind, SessionEventKind::SessionProcessing);
    let done = next_event(&mut events).await;
    assert_eq!(done.kind, SessionEventKind::SessionCompleted);
    assert_eq!(done.session.id, session.id);
}

#[tokio::test]
async fn test_second_start_rejected_while_recording() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    let first = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    let second = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await;
    assert!(matches!(second, Err(SessionError::AlreadyActive { .. })));

    // The first session is untouched: still Recording, still writable
    let current = h.manager.get_current().await.unwrap();
    assert_eq!(current.id, first.id);
    assert_eq!(current.status, SessionStatus::Recording);

    h.push_samples(&[0.1f32; 1600]);
    let stopped = h.manager.stop_recording().await.unwrap();
    assert_eq!(stopped.id, first.id);
}

#[tokio::test]
async fn test_mic_disconnect_fails_session_exactly_once() {
    let h = harness(Arc::new(StaticBridge(Ok("unused".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.push_samples(&[0.1f32; 1600]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The stream fires repeatedly; the per-session debounce lets one through
    h.push_error("device unplugged");
    h.push_error("device unplugged");
    h.push_error("device unplugged");

    let failed = h.wait_for_status(&session.id, SessionStatus::Failed).await;

    let message = failed.error_message.expect("error message recorded");
    assert!(message.contains("device unplugged"));

    let duration = failed.duration.expect("partial duration recorded");
    assert!(duration > 0.1 && duration < 1.0, "got {}", duration);

    // Partial audio was finalized and is readable
    let audio_file = h
        .manager
        .store()
        .resolve(failed.audio_path.as_deref().unwrap());
    let reader = hound::WavReader::open(&audio_file).unwrap();
    assert_eq!(reader.duration(), 1600);
}

#[tokio::test]
async fn test_late_disconnect_after_stop_is_a_noop() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();
    h.push_samples(&[0.1f32; 1600]);

    h.manager.stop_recording().await.unwrap();
    let completed = h.wait_for_status(&session.id, SessionStatus::Completed).await;

    // A disconnect that lost the race with the manual stop must not
    // corrupt the finished session
    h.push_error("late disconnect");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = h.manager.get(&session.id).unwrap().unwrap();
    assert_eq!(after.status, SessionStatus::Completed);
    assert_eq!(after.error_message, completed.error_message);
}

#[tokio::test]
async fn test_app_shutdown_interrupts_and_preserves_audio() {
    let h = harness(Arc::new(StaticBridge(Ok("unused".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.push_samples(&[0.2f32; 1600]);

    let finalize_ok = h.manager.handle_app_shutdown().await;
    assert!(finalize_ok);

    let interrupted = h.manager.get(&session.id).unwrap().unwrap();
    assert_eq!(interrupted.status, SessionStatus::Interrupted);
    assert!(interrupted.duration.is_some());
    assert!(interrupted.error_message.is_some());

    // Audio is playable after the shutdown finalize
    let audio_file = h
        .manager
        .store()
        .resolve(interrupted.audio_path.as_deref().unwrap());
    let reader = hound::WavReader::open(&audio_file).unwrap();
    assert_eq!(reader.duration(), 1600);
}

#[tokio::test]
async fn test_shutdown_without_recording_is_trivially_clean() {
    let h = harness(Arc::new(StaticBridge(Ok("unused".to_string()))));
    assert!(h.manager.handle_app_shutdown().await);
}

#[tokio::test]
async fn test_retry_after_transcription_failure() {
    let bridge = Arc::new(FlakyBridge {
        failures_left: AtomicUsize::new(1),
        text: "second attempt".to_string(),
    });
    let h = harness(bridge);

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();
    h.push_samples(&[0.1f32; 1600]);
    h.manager.stop_recording().await.unwrap();

    let failed = h.wait_for_status(&session.id, SessionStatus::Failed).await;
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("engine unavailable"));

    // Retry re-invokes the bridge on the existing audio, no re-recording
    let retried = h.manager.retry_transcription(&session.id).await.unwrap();
    assert_eq!(retried.status, SessionStatus::Processing);
    assert_eq!(retried.error_message, None);

    let completed = h.wait_for_status(&session.id, SessionStatus::Completed).await;
    let transcript =
        std::fs::read_to_string(h.manager.store().resolve(
            completed.transcript_path.as_deref().unwrap(),
        ))
        .unwrap();
    assert_eq!(transcript, "second attempt");
}

#[tokio::test]
async fn test_retry_from_interrupted_session() {
    let h = harness(Arc::new(StaticBridge(Ok("recovered text".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();
    h.push_samples(&[0.1f32; 1600]);
    h.manager.handle_app_shutdown().await;

    h.manager.retry_transcription(&session.id).await.unwrap();
    h.wait_for_status(&session.id, SessionStatus::Completed).await;
}

#[tokio::test]
async fn test_retry_rejects_unknown_and_recording_sessions() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    assert!(matches!(
        h.manager.retry_transcription("no-such-id").await,
        Err(SessionError::SessionNotFound { .. })
    ));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    assert!(matches!(
        h.manager.retry_transcription(&session.id).await,
        Err(SessionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_stop_without_active_recording_is_rejected() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    assert!(h.manager.stop_recording().await.is_err());

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();
    h.push_samples(&[0.1f32; 1600]);
    h.manager.stop_recording().await.unwrap();
    h.wait_for_status(&session.id, SessionStatus::Completed).await;

    // Second stop is not in the transition graph and leaves state alone
    let second_stop = h.manager.stop_recording().await;
    assert!(matches!(
        second_stop,
        Err(SessionError::InvalidTransition { .. })
    ));
    let unchanged = h.manager.get(&session.id).unwrap().unwrap();
    assert_eq!(unchanged.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_crash_leaves_recoverable_row_and_audio() {
    let h = harness(Arc::new(StaticBridge(Ok("unused".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();
    h.push_samples(&[0.1f32; 1600]);

    // Simulate a crash: nothing is stopped or finalized. A fresh store
    // opened on the same data root must still see the Recording row and
    // the (truncated) audio file.
    let root = h.manager.store().meetings_dir().parent().unwrap().to_path_buf();
    let fresh = SessionStore::open(&root).unwrap();

    let on_disk = fresh.get(&session.id).unwrap().unwrap();
    assert_eq!(on_disk.status, SessionStatus::Recording);
    assert!(fresh
        .resolve(on_disk.audio_path.as_deref().unwrap())
        .exists());

    // Next launch transitions the stale row to Interrupted
    let recovered = fresh.recover_interrupted().unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].id, session.id);
    assert_eq!(recovered[0].status, SessionStatus::Interrupted);
}

#[tokio::test]
async fn test_update_title_in_any_state() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    // While recording
    let renamed = h
        .manager
        .update_title(&session.id, "Sprint planning")
        .await
        .unwrap();
    assert_eq!(renamed.title, "Sprint planning");
    assert_eq!(renamed.status, SessionStatus::Recording);

    h.push_samples(&[0.1f32; 1600]);
    h.manager.stop_recording().await.unwrap();
    h.wait_for_status(&session.id, SessionStatus::Completed).await;

    // After completion
    h.manager
        .update_title(&session.id, "Sprint planning (final)")
        .await
        .unwrap();
    let reloaded = h.manager.get(&session.id).unwrap().unwrap();
    assert_eq!(reloaded.title, "Sprint planning (final)");

    // Empty titles are rejected
    assert!(h.manager.update_title(&session.id, "   ").await.is_err());
}

#[tokio::test]
async fn test_delete_rejected_while_active() {
    let h = harness(Arc::new(StaticBridge(Ok("ok".to_string()))));

    let session = h
        .manager
        .start_recording(AudioSourceKind::MicrophoneOnly)
        .await
        .unwrap();

    assert!(h.manager.delete(&session.id).await.is_err());

    h.push_samples(&[0.1f32; 1600]);
    h.manager.stop_recording().await.unwrap();
    h.wait_for_status(&session.id, SessionStatus::Completed).await;

    h.manager.delete(&session.id).await.unwrap();
    assert!(h.manager.get(&session.id).unwrap().is_none());
    assert!(h.manager.get_current().await.is_none());
}
