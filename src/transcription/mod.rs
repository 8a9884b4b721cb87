//! Transcription boundary.
//!
//! The engines themselves live outside this crate; the session manager
//! only needs the invocation contract: hand over an audio file path, get
//! back the transcript text or a failure.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Asynchronous speech-to-text boundary, invoked once per stop/retry.
#[async_trait::async_trait]
pub trait TranscriptionBridge: Send + Sync {
    /// Transcribe the audio file at `audio_path` to plain text.
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Bridge to a whisper.cpp-style CLI sidecar.
///
/// Runs `{binary} -m {model} -f {audio}` and takes stdout as the
/// transcript. The engine stays a separate process; this crate only owns
/// the invocation.
pub struct WhisperCliBridge {
    binary: String,
    model_path: PathBuf,
    language: Option<String>,
}

impl WhisperCliBridge {
    pub fn new(binary: String, model_path: PathBuf, language: Option<String>) -> Self {
        Self {
            binary,
            model_path,
            language,
        }
    }
}

#[async_trait::async_trait]
impl TranscriptionBridge for WhisperCliBridge {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        if !self.model_path.exists() {
            bail!("Model not found: {:?}", self.model_path);
        }

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(audio_path);
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }

        debug!("Invoking transcription: {} {:?}", self.binary, audio_path);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Checks that a recorded file is something a bridge can work with before
/// submitting it: present, 16-bit at the expected rate, and non-empty.
pub fn validate_audio_file(audio_path: &Path, expected_sample_rate: u32) -> Result<()> {
    if !audio_path.exists() {
        bail!("Audio file not found: {:?}", audio_path);
    }

    let reader = hound::WavReader::open(audio_path)
        .with_context(|| format!("Failed to open audio file {:?}", audio_path))?;

    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_rate != expected_sample_rate {
        bail!(
            "Audio format mismatch: expected 16-bit/{}Hz, got {}-bit/{}Hz",
            expected_sample_rate,
            spec.bits_per_sample,
            spec.sample_rate
        );
    }

    if reader.duration() == 0 {
        bail!("Audio file contains no samples: {:?}", audio_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_validate_accepts_16bit_16khz() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ok.wav");
        write_wav(&path, 16000, &[0, 1, -1, 2]);

        assert!(validate_audio_file(&path, 16000).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_rate() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wrong.wav");
        write_wav(&path, 44100, &[0, 1]);

        assert!(validate_audio_file(&path, 16000).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_audio() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.wav");
        write_wav(&path, 16000, &[]);

        assert!(validate_audio_file(&path, 16000).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(validate_audio_file(&tmp.path().join("nope.wav"), 16000).is_err());
    }
}
