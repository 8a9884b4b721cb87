//! Microphone capture via CPAL (Cross-Platform Audio Library).

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing::{info, warn};

use super::capture::{CaptureBackend, CaptureConfig, ErrorCallback, SampleCallback};
use crate::error::SessionError;

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by the backend and only touched from the
/// orchestration context; the audio data flows out through the callbacks,
/// never through the stream handle itself.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture backend.
///
/// Captures from the default input device at its native format and converts
/// in the callback to the configured target (mono, decimated to the target
/// rate) before handing blocks to `on_samples`. Stream errors go to
/// `on_error` as strings; the callback must not block.
pub struct CpalBackend {
    config: CaptureConfig,
    device: cpal::Device,
    stream: Option<SendableStream>,
}

impl CpalBackend {
    pub fn new(config: CaptureConfig) -> Result<Self, SessionError> {
        let host = cpal::default_host();
        let device =
            host.default_input_device()
                .ok_or_else(|| SessionError::DeviceUnavailable {
                    message: "no default input device".to_string(),
                })?;

        Ok(Self {
            config,
            device,
            stream: None,
        })
    }
}

impl CaptureBackend for CpalBackend {
    fn start(
        &mut self,
        on_samples: SampleCallback,
        on_error: ErrorCallback,
    ) -> Result<(), SessionError> {
        if self.stream.is_some() {
            warn!("Capture already started");
            return Ok(());
        }

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| SessionError::DeviceUnavailable {
                    message: format!("failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.config.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        info!(
            "Starting microphone capture: {}ch/{}Hz/{:?} -> 1ch/{}Hz",
            native_channels,
            native_rate,
            default_config.sample_format(),
            target_rate
        );

        let err_fn = move |err: cpal::StreamError| {
            on_error(err.to_string());
        };

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let block =
                            convert_to_mono_target_rate(data, native_channels, native_rate, target_rate);
                        on_samples(&block);
                    },
                    err_fn,
                    None,
                ),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                        let block = convert_to_mono_target_rate(
                            &floats,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        on_samples(&block);
                    },
                    err_fn,
                    None,
                ),
            fmt => {
                return Err(SessionError::DeviceUnavailable {
                    message: format!("unsupported native sample format: {:?}", fmt),
                })
            }
        }
        .map_err(|e| SessionError::DeviceUnavailable {
            message: format!("failed to build input stream: {}", e),
        })?;

        stream.play().map_err(|e| SessionError::DeviceUnavailable {
            message: format!("failed to start input stream: {}", e),
        })?;

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

/// Mix multi-channel audio to mono and decimate to the target rate.
fn convert_to_mono_target_rate(
    samples: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let mono: Vec<f32> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if source_rate == target_rate || source_rate < target_rate {
        return mono;
    }

    // Decimate: take every Nth sample
    let ratio = (source_rate / target_rate) as usize;
    mono.iter().step_by(ratio.max(1)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let samples = vec![0.5, -0.5, 1.0, 0.0];
        let out = convert_to_mono_target_rate(&samples, 2, 16000, 16000);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn test_decimation_halves_48k_to_16k() {
        let samples: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let out = convert_to_mono_target_rate(&samples, 1, 48000, 16000);
        assert_eq!(out.len(), 16);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 3.0);
    }

    #[test]
    fn test_lower_source_rate_passes_through() {
        let samples = vec![0.1, 0.2, 0.3];
        let out = convert_to_mono_target_rate(&samples, 1, 8000, 16000);
        assert_eq!(out, samples);
    }
}
