use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::SessionError;

/// Interval between lock-acquisition attempts during finalize.
const FINALIZE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Shared handle to an incrementally written WAV file.
///
/// The handle is cloned into the audio callback, which appends sample
/// blocks at device cadence, while the orchestration context keeps its own
/// clone for finalization. `Arc::try_unwrap` is not an option here: the
/// callback thread may still hold a live reference at the moment finalize
/// is requested. Instead the handle carries an atomic `closed` flag and the
/// encoder sits behind a mutex that finalize acquires with a bounded
/// non-blocking retry loop. The audio thread never waits on anything.
pub struct WavWriterHandle {
    inner: Arc<Mutex<Option<hound::WavWriter<BufWriter<File>>>>>,
    closed: Arc<AtomicBool>,
}

impl WavWriterHandle {
    /// Creates the WAV file at `path` and opens it for incremental writing.
    pub fn create(path: &Path, spec: hound::WavSpec) -> Result<Self> {
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        debug!(
            "WAV writer opened: {:?} ({}Hz, {} channel(s), {}bit)",
            path, spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(writer))),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Appends a block of float samples, converting to 16-bit PCM.
    ///
    /// Once the close flag is set this is a silent no-op: the audio thread
    /// must never block or error because a finalize is in progress. Each
    /// block is flushed so the file stays valid up to the last completed
    /// write if the process dies mid-recording.
    pub fn write_samples(&self, samples: &[f32]) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }

        if let Ok(mut guard) = self.inner.lock() {
            if let Some(writer) = guard.as_mut() {
                for sample in samples {
                    let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer
                        .write_sample(sample_i16)
                        .context("Failed to write sample to WAV")?;
                }
                writer.flush().context("Failed to flush WAV writer")?;
            }
        }
        Ok(())
    }

    /// Whether the close flag has been set.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Finalizes the WAV container within `timeout`.
    ///
    /// Sets the close flag first so the callback stops appending, then
    /// repeatedly attempts a non-blocking acquisition of the encoder lock.
    /// On success the writer is taken out of the handle and the container
    /// header is completed. On deadline expiry the file keeps every byte
    /// flushed before the timeout. Finalizing an already-finalized handle
    /// is a no-op success.
    pub fn finalize_with_timeout(&self, timeout: Duration) -> Result<(), SessionError> {
        let timer = Instant::now();
        let mut retry_count = 0u32;

        self.closed.store(true, Ordering::SeqCst);
        debug!("WAV finalize: close flag set, timeout {:?}", timeout);

        let deadline = Instant::now() + timeout;

        loop {
            if let Ok(mut guard) = self.inner.try_lock() {
                let Some(writer) = guard.take() else {
                    debug!("WAV finalize: already finalized");
                    return Ok(());
                };

                let elapsed_ms = timer.elapsed().as_millis();
                match writer.finalize() {
                    Ok(()) => {
                        info!(
                            "WAV finalized in {}ms after {} retries",
                            elapsed_ms, retry_count
                        );
                        return Ok(());
                    }
                    Err(e) => {
                        error!("WAV finalize failed after {}ms: {}", elapsed_ms, e);
                        return Err(SessionError::Invalid(format!("WAV finalize failed: {}", e)));
                    }
                }
            }

            retry_count += 1;

            if Instant::now() >= deadline {
                warn!(
                    "WAV finalize timed out after {:?} ({} retries); partial audio saved",
                    timeout, retry_count
                );
                return Err(SessionError::FinalizeTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            thread::sleep(FINALIZE_RETRY_INTERVAL);
        }
    }

    /// Takes the encoder lock and holds it for `hold`. Test hook for
    /// exercising the finalize deadline.
    #[doc(hidden)]
    pub fn hold_encoder_lock_for(&self, hold: Duration) {
        let guard = self.inner.lock().unwrap();
        thread::sleep(hold);
        drop(guard);
    }
}

impl Clone for WavWriterHandle {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            closed: Arc::clone(&self.closed),
        }
    }
}
