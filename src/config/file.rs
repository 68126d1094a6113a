//! TOML configuration file loading
//!
//! Supports `~/.config/sparkbot/config.toml` (or `$SPARKBOT_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SparkbotConfigFile {
    /// Audio codec configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Utterance capture limits
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Wakeword/VAD detector tuning
    #[serde(default)]
    pub detector: DetectorFileConfig,

    /// Remote speech-to-text service
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Remote chat service
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Remote text-to-speech service
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Pipeline routing and timing
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Acknowledgement clips
    #[serde(default)]
    pub clips: ClipsFileConfig,
}

/// Audio codec configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Sample rate shared by microphone, speaker and remote services
    pub sample_rate: Option<u32>,

    /// Linear microphone gain
    pub mic_gain: Option<f32>,
}

/// Utterance capture limits
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Maximum utterance duration in milliseconds
    pub max_ms: Option<u64>,

    /// Minimum utterance duration in milliseconds
    pub min_ms: Option<u64>,
}

/// Wakeword/VAD detector tuning
#[derive(Debug, Default, Deserialize)]
pub struct DetectorFileConfig {
    pub silence_poll_ms: Option<u64>,
    pub silence_polls: Option<u32>,
    pub listen_timeout_ms: Option<u64>,
    pub energy_threshold: Option<f32>,
    pub wake_ms: Option<u64>,
}

/// Remote speech-to-text service
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub dev_pid: Option<u32>,
    pub cuid: Option<String>,
    pub upload_chunk_bytes: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Remote chat service
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Remote text-to-speech service
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub cuid: Option<String>,
    pub lang: Option<String>,
    pub speed: Option<u8>,
    pub pitch: Option<u8>,
    pub volume: Option<u8>,
    pub person: Option<u32>,
    pub aue: Option<u8>,
    pub chunk_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Pipeline routing and timing
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Initial mode ("idle", "chat", "image")
    pub mode: Option<String>,

    /// Capacity of the STT→chat and chat→TTS text channels
    pub text_queue: Option<usize>,

    /// Upper bound on waiting for the playback worker to take a chunk
    pub playback_timeout_ms: Option<u64>,

    /// Pause after a reply before reverting the face to "look"
    pub look_delay_ms: Option<u64>,
}

/// Acknowledgement clip paths
#[derive(Debug, Default, Deserialize)]
pub struct ClipsFileConfig {
    /// Clip played when the wakeword is heard
    pub wake: Option<PathBuf>,

    /// Clip played on an external chime request
    pub chime: Option<PathBuf>,
}

/// Parse a config file from its TOML text
///
/// # Errors
///
/// Returns error if the text is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<SparkbotConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `SparkbotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SparkbotConfigFile {
    let Some(path) = config_file_path() else {
        return SparkbotConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> SparkbotConfigFile {
    if !path.exists() {
        return SparkbotConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SparkbotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SparkbotConfigFile::default()
        }
    }
}

/// Return the config file path: `$SPARKBOT_CONFIG` or `~/.config/sparkbot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SPARKBOT_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("sparkbot").join("config.toml"))
}
