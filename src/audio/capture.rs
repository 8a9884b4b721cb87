use std::sync::Arc;

use crate::error::SessionError;
use crate::session::AudioSourceKind;

/// Block of float samples delivered from the capture thread.
pub type SampleCallback = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Stream-error notification from the capture thread. Must be cheap and
/// non-blocking; real handling happens in the orchestration context.
pub type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Configuration for a capture backend.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (backends resample/decimate if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for Whisper-class STT
            channels: 1,
        }
    }
}

/// Audio capture backend trait.
///
/// Implementations deliver fixed-size sample blocks via `on_samples` on a
/// real-time thread and report stream failures via `on_error`. Neither
/// callback may block.
pub trait CaptureBackend: Send {
    /// Start capturing. Callbacks are registered once, before any block is
    /// delivered.
    fn start(
        &mut self,
        on_samples: SampleCallback,
        on_error: ErrorCallback,
    ) -> Result<(), SessionError>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<(), SessionError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Builds capture backends for the requested audio source.
pub trait CaptureFactory: Send + Sync {
    fn create(
        &self,
        source: &AudioSourceKind,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, SessionError>;
}

/// Default factory backed by the CPAL microphone backend.
pub struct DefaultCaptureFactory;

impl CaptureFactory for DefaultCaptureFactory {
    /// System and mixed capture need a platform system-audio bridge that
    /// this build does not carry; those sources fail with
    /// `DeviceUnavailable` rather than silently recording the wrong thing.
    fn create(
        &self,
        source: &AudioSourceKind,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, SessionError> {
        match source {
            AudioSourceKind::MicrophoneOnly => {
                let backend = super::cpal_backend::CpalBackend::new(config)?;
                Ok(Box::new(backend))
            }
            AudioSourceKind::SystemOnly | AudioSourceKind::Mixed => {
                Err(SessionError::DeviceUnavailable {
                    message: format!("{:?} capture is not supported on this platform", source),
                })
            }
        }
    }
}
