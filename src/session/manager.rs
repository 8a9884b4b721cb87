use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{EventBus, SessionEventKind};
use super::model::{
    default_title, validate_transition, AudioSourceKind, MeetingSession, SessionStatus,
};
use crate::audio::{
    CaptureBackend, CaptureConfig, CaptureFactory, ErrorCallback, SampleCallback, WavWriterHandle,
};
use crate::config::RecordingConfig;
use crate::error::{Result, SessionError, StorageError};
use crate::store::SessionStore;
use crate::transcription::{validate_audio_file, TranscriptionBridge};

/// Mutable state behind the orchestration mutex.
///
/// Everything that belongs to the single active session lives here: the
/// record snapshot, the capture backend, the WAV handle, and the wall-clock
/// anchor for duration.
struct ManagerState {
    current: Option<MeetingSession>,
    capture: Option<Box<dyn CaptureBackend>>,
    wav_writer: Option<WavWriterHandle>,
    recording_started: Option<Instant>,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            current: None,
            capture: None,
            wav_writer: None,
            recording_started: None,
        }
    }
}

/// The lifecycle authority for meeting sessions.
///
/// All commands are serialized by one mutex; the "at most one session in
/// Recording/Processing" invariant is enforced here and nowhere else. The
/// audio callback thread never touches this state; its only shared-state
/// interactions are the close-flag-guarded WAV append and the debounced
/// error signal consumed by the recovery coordinator.
pub struct SessionManager {
    state: Mutex<ManagerState>,
    store: SessionStore,
    bridge: Arc<dyn TranscriptionBridge>,
    capture_factory: Arc<dyn CaptureFactory>,
    capture_config: CaptureConfig,
    recording_config: RecordingConfig,
    events: EventBus,
    /// Funnel for capture-thread stream errors; drained by the recovery
    /// coordinator on the orchestration side.
    error_tx: UnboundedSender<String>,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        bridge: Arc<dyn TranscriptionBridge>,
        capture_factory: Arc<dyn CaptureFactory>,
        capture_config: CaptureConfig,
        recording_config: RecordingConfig,
        error_tx: UnboundedSender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ManagerState::default()),
            store,
            bridge,
            capture_factory,
            capture_config,
            recording_config,
            events: EventBus::default(),
            error_tx,
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Starts recording a new session. Valid only when no session occupies
    /// Recording/Processing; fails fast with `AlreadyActive` otherwise and
    /// mutates nothing.
    pub async fn start_recording(&self, audio_source: AudioSourceKind) -> Result<MeetingSession> {
        let mut state = self.state.lock().await;

        if let Some(current) = &state.current {
            if current.status.is_active() {
                warn!(
                    "Rejecting start: session {} is {}",
                    current.id,
                    current.status.as_str()
                );
                return Err(SessionError::AlreadyActive {
                    status: current.status.as_str().to_string(),
                });
            }
        }

        // Open the device before anything is persisted: DeviceUnavailable
        // must leave no session behind.
        let mut capture = self
            .capture_factory
            .create(&audio_source, self.capture_config.clone())?;

        let id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp();
        let title = default_title(created_at);

        let mut session = MeetingSession::new(id.clone(), title, created_at, audio_source);

        let audio_rel = format!("{}/audio.wav", id);
        let session_dir = self.store.session_dir(&id);
        std::fs::create_dir_all(&session_dir).map_err(StorageError::Io)?;

        let spec = hound::WavSpec {
            channels: self.capture_config.channels,
            sample_rate: self.capture_config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let wav_handle = WavWriterHandle::create(&self.store.resolve(&audio_rel), spec)
            .map_err(|e| SessionError::Invalid(format!("Failed to open WAV writer: {}", e)))?;

        let writer = wav_handle.clone();
        let on_samples: SampleCallback = Arc::new(move |samples: &[f32]| {
            if let Err(e) = writer.write_samples(samples) {
                error!("Failed to write audio samples: {}", e);
            }
        });

        // Per-session debounce: whatever the stream does afterwards, at
        // most one error crosses into the orchestration context.
        let fired = Arc::new(AtomicBool::new(false));
        let error_tx = self.error_tx.clone();
        let on_error: ErrorCallback = Arc::new(move |message: String| {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            let _ = error_tx.send(message);
        });

        if let Err(e) = capture.start(on_samples, on_error) {
            // No session is created on a failed start
            let _ = wav_handle.finalize_with_timeout(Duration::from_millis(100));
            let _ = std::fs::remove_dir_all(&session_dir);
            return Err(e);
        }

        session.status = SessionStatus::Recording;
        session.audio_path = Some(audio_rel.clone());

        // The row must be durable before the caller hears "started".
        if let Err(e) = self.store.create(&session) {
            let _ = capture.stop();
            let _ = wav_handle.finalize_with_timeout(Duration::from_millis(100));
            let _ = std::fs::remove_dir_all(&session_dir);
            return Err(e.into());
        }

        info!(
            "Recording started: {} ({:?}, {})",
            session.id, session.audio_source, audio_rel
        );

        state.current = Some(session.clone());
        state.capture = Some(capture);
        state.wav_writer = Some(wav_handle);
        state.recording_started = Some(Instant::now());

        self.events
            .publish(SessionEventKind::SessionStarted, &session);

        Ok(session)
    }

    /// Stops the active recording, finalizes the WAV within the configured
    /// deadline, and hands the file to the transcription bridge. A finalize
    /// timeout is logged but never aborts the transition: whatever was
    /// flushed still goes downstream.
    pub async fn stop_recording(self: &Arc<Self>) -> Result<MeetingSession> {
        let mut state = self.state.lock().await;

        let session = match &state.current {
            Some(s) if s.status == SessionStatus::Recording => s.clone(),
            Some(s) => {
                return Err(SessionError::InvalidTransition {
                    from: s.status.as_str().to_string(),
                    to: SessionStatus::Processing.as_str().to_string(),
                })
            }
            None => {
                return Err(SessionError::Invalid(
                    "no active recording session".to_string(),
                ))
            }
        };

        info!("Stopping recording session: {}", session.id);

        self.teardown_capture(&mut state).await;

        let duration = Self::elapsed_duration(&mut state, &session);

        let mut session = session;
        validate_transition(&session.status, &SessionStatus::Processing)?;
        session.status = SessionStatus::Processing;
        session.duration = Some(duration);

        if let Err(e) = self.store.save(&session) {
            return Err(self.force_failed(&mut state, session, e));
        }
        state.current = Some(session.clone());

        self.events
            .publish(SessionEventKind::SessionStopped, &session);
        self.events
            .publish(SessionEventKind::SessionProcessing, &session);

        info!(
            "Recording stopped: {} (duration {:.1}s)",
            session.id, duration
        );

        let audio_rel = session.audio_path.clone().ok_or_else(|| {
            SessionError::Invalid(format!("session {} has no audio path", session.id))
        })?;
        self.spawn_transcription(session.id.clone(), audio_rel);

        Ok(session)
    }

    /// Handles a stream error raised mid-recording. A late event (the
    /// session already stopped, failed, or never existed) is a no-op, not
    /// a state corruption.
    pub async fn handle_mic_disconnect(&self, error_message: &str) {
        let mut state = self.state.lock().await;

        let session = match &state.current {
            Some(s) if s.status == SessionStatus::Recording => s.clone(),
            Some(s) => {
                debug!(
                    "Ignoring mic disconnect: session {} is {}",
                    s.id,
                    s.status.as_str()
                );
                return;
            }
            None => {
                debug!("Ignoring mic disconnect: no active session");
                return;
            }
        };

        error!(
            "Mic disconnect during session {}: {}",
            session.id, error_message
        );

        self.teardown_capture(&mut state).await;

        let duration = Self::elapsed_duration(&mut state, &session);

        let mut session = session;
        session.status = SessionStatus::Failed;
        session.duration = Some(duration);
        session.error_message = Some(format!("Microphone disconnected: {}", error_message));

        if let Err(e) = self.store.save(&session) {
            error!("Failed to persist disconnect for {}: {}", session.id, e);
        }
        state.current = Some(session.clone());

        self.events.publish(SessionEventKind::SessionFailed, &session);

        info!(
            "Session {} failed on disconnect, partial audio retained ({:.1}s)",
            session.id, duration
        );
    }

    /// Handles process shutdown while recording. Finalizes with the shorter
    /// shutdown deadline and persists Interrupted. Returns whether finalize
    /// succeeded so the caller can decide whether to delay process exit.
    pub async fn handle_app_shutdown(&self) -> bool {
        let mut state = self.state.lock().await;

        let session = match &state.current {
            Some(s) if s.status == SessionStatus::Recording => s.clone(),
            _ => {
                debug!("Shutdown: no recording in progress, nothing to finalize");
                return true;
            }
        };

        warn!(
            "Interrupting active recording {} for app shutdown",
            session.id
        );

        if let Some(mut capture) = state.capture.take() {
            if let Err(e) = capture.stop() {
                warn!("Failed to stop capture during shutdown: {}", e);
            }
        }

        let timeout = Duration::from_secs(self.recording_config.shutdown_finalize_timeout_secs);
        let finalize_ok = match state.wav_writer.take() {
            Some(handle) => {
                let result =
                    tokio::task::spawn_blocking(move || handle.finalize_with_timeout(timeout))
                        .await;
                match result {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!("WAV finalize during shutdown failed: {}", e);
                        false
                    }
                    Err(e) => {
                        error!("WAV finalize task panicked during shutdown: {}", e);
                        false
                    }
                }
            }
            None => true,
        };

        let duration = Self::elapsed_duration(&mut state, &session);

        let mut session = session;
        session.status = SessionStatus::Interrupted;
        session.duration = Some(duration);
        session.error_message = Some("Session interrupted by app shutdown".to_string());

        if let Err(e) = self.store.save(&session) {
            error!("Failed to persist interruption for {}: {}", session.id, e);
        }
        state.current = Some(session.clone());

        info!(
            "Session {} interrupted by shutdown (duration {:.1}s, finalize_ok={})",
            session.id, duration, finalize_ok
        );

        finalize_ok
    }

    /// Re-submits an existing recording to the transcription bridge. Valid
    /// for Failed, Completed, and Interrupted sessions.
    pub async fn retry_transcription(self: &Arc<Self>, id: &str) -> Result<MeetingSession> {
        let mut state = self.state.lock().await;

        if let Some(current) = &state.current {
            if current.status.is_active() && current.id != id {
                return Err(SessionError::AlreadyActive {
                    status: current.status.as_str().to_string(),
                });
            }
        }

        let mut session = self
            .store
            .get(id)?
            .ok_or_else(|| SessionError::SessionNotFound { id: id.to_string() })?;

        // Recording -> Processing exists in the graph, but that edge
        // belongs to stop_recording; retry only applies to settled
        // sessions.
        if !matches!(
            session.status,
            SessionStatus::Failed | SessionStatus::Completed | SessionStatus::Interrupted
        ) {
            return Err(SessionError::InvalidTransition {
                from: session.status.as_str().to_string(),
                to: SessionStatus::Processing.as_str().to_string(),
            });
        }

        let audio_rel = session.audio_path.clone().ok_or_else(|| {
            SessionError::Invalid("session has no audio file to transcribe".to_string())
        })?;

        info!("Retrying transcription for session {}", id);

        session.status = SessionStatus::Processing;
        session.error_message = None;
        self.store.save(&session)?;
        state.current = Some(session.clone());

        self.events
            .publish(SessionEventKind::SessionProcessing, &session);

        self.spawn_transcription(session.id.clone(), audio_rel);

        Ok(session)
    }

    /// Updates a session title. Pure metadata mutation, valid in any state.
    pub async fn update_title(&self, id: &str, title: &str) -> Result<MeetingSession> {
        if title.trim().is_empty() {
            return Err(SessionError::Invalid("title cannot be empty".to_string()));
        }

        let mut state = self.state.lock().await;

        let mut session = self
            .store
            .get(id)?
            .ok_or_else(|| SessionError::SessionNotFound { id: id.to_string() })?;

        session.title = title.to_string();
        self.store.save(&session)?;

        if let Some(current) = state.current.as_mut() {
            if current.id == id {
                current.title = title.to_string();
            }
        }

        info!("Updated title for session {}: {}", id, title);
        Ok(session)
    }

    /// Records the path of a summary written by a later pipeline stage.
    pub async fn update_summary_path(&self, id: &str, summary_path: &str) -> Result<MeetingSession> {
        let mut state = self.state.lock().await;

        let mut session = self
            .store
            .get(id)?
            .ok_or_else(|| SessionError::SessionNotFound { id: id.to_string() })?;

        session.summary_path = Some(summary_path.to_string());
        self.store.save(&session)?;

        if let Some(current) = state.current.as_mut() {
            if current.id == id {
                current.summary_path = Some(summary_path.to_string());
            }
        }

        Ok(session)
    }

    /// Snapshot of the session currently owned by the manager, if any.
    pub async fn get_current(&self) -> Option<MeetingSession> {
        self.state.lock().await.current.clone()
    }

    pub async fn current_status(&self) -> Option<SessionStatus> {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map(|s| s.status.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<MeetingSession>> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> Result<Vec<MeetingSession>> {
        Ok(self.store.list()?)
    }

    /// Deletes a session record and its directory. The active session
    /// cannot be deleted out from under the recorder.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(current) = &state.current {
            if current.id == id && current.status.is_active() {
                return Err(SessionError::Invalid(
                    "cannot delete a session while it is recording or processing".to_string(),
                ));
            }
        }

        self.store.delete(id)?;

        if state.current.as_ref().map(|s| s.id.as_str()) == Some(id) {
            state.current = None;
        }

        Ok(())
    }

    /// Startup recovery for sessions left in Recording by a crash.
    pub fn recover_interrupted(&self) -> Result<Vec<MeetingSession>> {
        Ok(self.store.recover_interrupted()?)
    }

    /// Stops the capture backend and finalizes the WAV with the configured
    /// deadline. Shared by stop and disconnect paths; whichever runs first
    /// does the real work, the loser finds the state already taken.
    async fn teardown_capture(&self, state: &mut ManagerState) {
        if let Some(mut capture) = state.capture.take() {
            if let Err(e) = capture.stop() {
                warn!("Failed to stop capture backend: {}", e);
            }
        }

        if let Some(handle) = state.wav_writer.take() {
            let timeout = Duration::from_secs(self.recording_config.finalize_timeout_secs);
            let result =
                tokio::task::spawn_blocking(move || handle.finalize_with_timeout(timeout)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Non-fatal: bytes flushed before the deadline stay
                    // valid and the file is still handed downstream.
                    warn!("WAV finalize failed: {}", e);
                }
                Err(e) => error!("WAV finalize task panicked: {}", e),
            }
        }
    }

    fn elapsed_duration(state: &mut ManagerState, session: &MeetingSession) -> f64 {
        match state.recording_started.take() {
            Some(started) => started.elapsed().as_secs_f64(),
            None => {
                // Fall back to wall-clock delta from creation (recovered
                // sessions have no in-process start instant).
                (chrono::Utc::now().timestamp() - session.created_at).max(0) as f64
            }
        }
    }

    /// Persist a mid-lifecycle storage failure as a Failed transition and
    /// hand the original error back to the caller.
    fn force_failed(
        &self,
        state: &mut ManagerState,
        mut session: MeetingSession,
        storage_err: StorageError,
    ) -> SessionError {
        error!(
            "Storage failure for session {}: {}; forcing Failed",
            session.id, storage_err
        );

        session.status = SessionStatus::Failed;
        session.error_message = Some(format!("storage failure: {}", storage_err));
        if let Err(e) = self.store.save(&session) {
            error!("Failed to persist Failed status for {}: {}", session.id, e);
        }
        state.current = Some(session.clone());
        self.events.publish(SessionEventKind::SessionFailed, &session);

        SessionError::Storage(storage_err)
    }

    fn spawn_transcription(self: &Arc<Self>, id: String, audio_rel: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_transcription(&id, &audio_rel).await;
        });
    }

    /// Drives one transcription attempt to Completed or Failed. Runs
    /// outside the orchestration mutex; the lock is re-taken only for the
    /// final state update.
    async fn run_transcription(&self, id: &str, audio_rel: &str) {
        debug!("Transcription task started for session {}", id);

        let audio_path = self.store.resolve(audio_rel);

        let outcome = match validate_audio_file(&audio_path, self.capture_config.sample_rate) {
            Ok(()) => self.bridge.transcribe(&audio_path).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => {
                if let Err(e) = self.complete_transcription(id, &text).await {
                    error!("Failed to record transcript for {}: {}", id, e);
                    self.fail_transcription(id, &format!("Failed to save transcript: {}", e))
                        .await;
                }
            }
            Err(e) => {
                self.fail_transcription(id, &format!("Transcription failed: {}", e))
                    .await;
            }
        }
    }

    async fn complete_transcription(&self, id: &str, text: &str) -> Result<()> {
        let transcript_rel = format!("{}/transcript.txt", id);
        let transcript_path = self.store.resolve(&transcript_rel);
        std::fs::write(&transcript_path, text).map_err(StorageError::Io)?;

        let mut state = self.state.lock().await;

        let mut session = self
            .store
            .get(id)?
            .ok_or_else(|| SessionError::SessionNotFound { id: id.to_string() })?;

        validate_transition(&session.status, &SessionStatus::Completed)?;
        session.status = SessionStatus::Completed;
        session.transcript_path = Some(transcript_rel);
        self.store.save(&session)?;

        if state.current.as_ref().map(|s| s.id.as_str()) == Some(id) {
            state.current = Some(session.clone());
        }

        self.events
            .publish(SessionEventKind::SessionCompleted, &session);

        info!("Session {} completed, transcript saved", id);
        Ok(())
    }

    async fn fail_transcription(&self, id: &str, error_message: &str) {
        error!("Session {}: {}", id, error_message);

        let mut state = self.state.lock().await;

        let mut session = match self.store.get(id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!("Session {} vanished before failure could be recorded", id);
                return;
            }
            Err(e) => {
                error!("Failed to load session {} for failure update: {}", id, e);
                return;
            }
        };

        session.status = SessionStatus::Failed;
        session.error_message = Some(error_message.to_string());
        if let Err(e) = self.store.save(&session) {
            error!("Failed to persist failure for {}: {}", id, e);
        }

        if state.current.as_ref().map(|s| s.id.as_str()) == Some(id) {
            state.current = Some(session.clone());
        }

        self.events.publish(SessionEventKind::SessionFailed, &session);
    }
}
