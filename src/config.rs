use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    /// Whisper-style CLI binary to invoke
    pub binary: String,
    /// Path to the model file passed via `-m`
    pub model_path: String,
    /// Optional language code passed via `-l`
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Root directory for session data. Sessions live under
    /// `{data_root}/meetings/{id}/`.
    pub data_root: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Deadline for WAV finalization on stop/disconnect, in seconds.
    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,

    /// Deadline for WAV finalization during app shutdown. Kept shorter
    /// than the host process's own exit deadline.
    #[serde(default = "default_shutdown_finalize_timeout_secs")]
    pub shutdown_finalize_timeout_secs: u64,
}

fn default_finalize_timeout_secs() -> u64 {
    5
}

fn default_shutdown_finalize_timeout_secs() -> u64 {
    3
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            finalize_timeout_secs: default_finalize_timeout_secs(),
            shutdown_finalize_timeout_secs: default_shutdown_finalize_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_config_defaults() {
        let cfg = RecordingConfig::default();
        assert_eq!(cfg.finalize_timeout_secs, 5);
        assert_eq!(cfg.shutdown_finalize_timeout_secs, 3);
        assert!(cfg.shutdown_finalize_timeout_secs < cfg.finalize_timeout_secs);
    }
}
