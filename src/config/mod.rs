//! Configuration management for the voice pipeline
//!
//! Loaded once at startup and treated as immutable for the process lifetime.
//! Priority is env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineMode;
use crate::voice::bytes_for_ms;
use crate::{Error, Result};

use file::SparkbotConfigFile;

/// Default remote STT endpoint
pub const DEFAULT_STT_URL: &str = "http://vop.baidu.com/server_api";

/// Default remote chat endpoint
pub const DEFAULT_CHAT_URL: &str =
    "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/ernie-lite-8k";

/// Default remote TTS endpoint
pub const DEFAULT_TTS_URL: &str = "https://tsn.baidu.com/text2audio";

/// Default system preamble sent with every chat request
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Keep your answer as concise as possible, no more than 200 words.";

/// Voice pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Audio codec configuration
    pub audio: AudioConfig,

    /// Utterance capture limits
    pub capture: CaptureConfig,

    /// Wakeword/VAD detector tuning
    pub detector: DetectorConfig,

    /// Remote speech-to-text service
    pub stt: SttConfig,

    /// Remote chat service
    pub chat: ChatConfig,

    /// Remote text-to-speech service
    pub tts: TtsConfig,

    /// Pipeline routing and timing
    pub pipeline: PipelineConfig,

    /// Acknowledgement clips
    pub clips: ClipsConfig,
}

/// Audio codec configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate for microphone, speaker and remote services (16-bit mono)
    pub sample_rate: u32,

    /// Linear microphone gain applied before feeding the engine
    pub mic_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            mic_gain: 1.0,
        }
    }
}

/// Utterance capture limits
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Longest utterance kept; reaching it forces the end of capture
    pub max_duration: Duration,

    /// Utterances at or below this are discarded instead of transcribed
    pub min_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(8),
            min_duration: Duration::from_millis(600),
        }
    }
}

impl CaptureConfig {
    /// Utterance buffer capacity in bytes
    #[must_use]
    pub fn max_bytes(&self, sample_rate: u32) -> usize {
        bytes_for_ms(sample_rate, self.max_duration)
    }

    /// Minimum forwarded utterance length in bytes
    #[must_use]
    pub fn min_bytes(&self, sample_rate: u32) -> usize {
        bytes_for_ms(sample_rate, self.min_duration)
    }
}

/// Wakeword/VAD detector tuning
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Pause between silence re-checks while capturing
    pub silence_poll: Duration,

    /// Number of re-checks before silence ends the capture
    pub silence_polls: u32,

    /// How long to wait for speech after the wakeword
    pub listen_timeout: Duration,

    /// RMS level above which a chunk counts as speech (energy engine)
    pub energy_threshold: f32,

    /// Minimum speech burst that arms the energy engine's wake trigger
    pub wake_duration: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            silence_poll: Duration::from_millis(100),
            silence_polls: 20,
            listen_timeout: Duration::from_secs(8),
            energy_threshold: 0.03,
            wake_duration: Duration::from_millis(300),
        }
    }
}

/// Remote speech-to-text service
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub url: String,
    pub token: Option<String>,
    /// Language/model profile id
    pub dev_pid: u32,
    /// Caller id reported to the service
    pub cuid: String,
    /// Size of each streamed upload write
    pub upload_chunk_bytes: usize,
    pub timeout: Duration,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STT_URL.to_string(),
            token: None,
            dev_pid: 1537,
            cuid: "sparkbot".to_string(),
            upload_chunk_bytes: 1460,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Remote chat service
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub url: String,
    pub token: Option<String>,
    /// Fixed preamble constraining reply length
    pub system_prompt: String,
    pub timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_string(),
            token: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Remote text-to-speech service
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub url: String,
    pub token: Option<String>,
    pub cuid: String,
    pub lang: String,
    pub speed: u8,
    pub pitch: u8,
    pub volume: u8,
    /// Voice id
    pub person: u32,
    /// Audio encoding id (4 = raw 16 kHz PCM)
    pub aue: u8,
    /// Playback slice duration
    pub chunk_duration: Duration,
    pub timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TTS_URL.to_string(),
            token: None,
            cuid: "sparkbot".to_string(),
            lang: "zh".to_string(),
            speed: 6,
            pitch: 5,
            volume: 8,
            person: 4100,
            aue: 4,
            chunk_duration: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Pipeline routing and timing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Initial routing mode
    pub mode: PipelineMode,

    /// Capacity of each text channel
    pub text_queue: usize,

    /// Bound on waiting for the playback worker to accept a chunk
    pub playback_timeout: Duration,

    /// Pause after a reply before reverting the face
    pub look_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Chat,
            text_queue: 16,
            playback_timeout: Duration::from_secs(5),
            look_delay: Duration::from_millis(300),
        }
    }
}

/// Acknowledgement clip paths (synthesized tones when unset)
#[derive(Debug, Clone, Default)]
pub struct ClipsConfig {
    pub wake: Option<PathBuf>,
    pub chime: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the mode is unknown or limits are inconsistent
    pub fn resolve<F>(fc: SparkbotConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
            mic_gain: fc.audio.mic_gain.unwrap_or(defaults.audio.mic_gain),
        };

        let capture = CaptureConfig {
            max_duration: fc
                .capture
                .max_ms
                .map_or(defaults.capture.max_duration, Duration::from_millis),
            min_duration: fc
                .capture
                .min_ms
                .map_or(defaults.capture.min_duration, Duration::from_millis),
        };

        let detector = DetectorConfig {
            silence_poll: fc
                .detector
                .silence_poll_ms
                .map_or(defaults.detector.silence_poll, Duration::from_millis),
            silence_polls: fc
                .detector
                .silence_polls
                .unwrap_or(defaults.detector.silence_polls),
            listen_timeout: fc
                .detector
                .listen_timeout_ms
                .map_or(defaults.detector.listen_timeout, Duration::from_millis),
            energy_threshold: fc
                .detector
                .energy_threshold
                .unwrap_or(defaults.detector.energy_threshold),
            wake_duration: fc
                .detector
                .wake_ms
                .map_or(defaults.detector.wake_duration, Duration::from_millis),
        };

        // STT token doubles as the TTS token (same speech account)
        let stt_token = env("SPARKBOT_STT_TOKEN").or(fc.stt.token);
        let stt = SttConfig {
            url: env("SPARKBOT_STT_URL")
                .or(fc.stt.url)
                .unwrap_or(defaults.stt.url),
            token: stt_token.clone(),
            dev_pid: fc.stt.dev_pid.unwrap_or(defaults.stt.dev_pid),
            cuid: fc.stt.cuid.unwrap_or(defaults.stt.cuid),
            upload_chunk_bytes: fc
                .stt
                .upload_chunk_bytes
                .unwrap_or(defaults.stt.upload_chunk_bytes),
            timeout: fc
                .stt
                .timeout_secs
                .map_or(defaults.stt.timeout, Duration::from_secs),
        };

        let chat = ChatConfig {
            url: env("SPARKBOT_CHAT_URL")
                .or(fc.chat.url)
                .unwrap_or(defaults.chat.url),
            token: env("SPARKBOT_CHAT_TOKEN").or(fc.chat.token),
            system_prompt: fc
                .chat
                .system_prompt
                .unwrap_or(defaults.chat.system_prompt),
            timeout: fc
                .chat
                .timeout_secs
                .map_or(defaults.chat.timeout, Duration::from_secs),
        };

        let tts = TtsConfig {
            url: env("SPARKBOT_TTS_URL")
                .or(fc.tts.url)
                .unwrap_or(defaults.tts.url),
            token: env("SPARKBOT_TTS_TOKEN").or(fc.tts.token).or(stt_token),
            cuid: fc.tts.cuid.unwrap_or(defaults.tts.cuid),
            lang: fc.tts.lang.unwrap_or(defaults.tts.lang),
            speed: fc.tts.speed.unwrap_or(defaults.tts.speed),
            pitch: fc.tts.pitch.unwrap_or(defaults.tts.pitch),
            volume: fc.tts.volume.unwrap_or(defaults.tts.volume),
            person: fc.tts.person.unwrap_or(defaults.tts.person),
            aue: fc.tts.aue.unwrap_or(defaults.tts.aue),
            chunk_duration: fc
                .tts
                .chunk_ms
                .map_or(defaults.tts.chunk_duration, Duration::from_millis),
            timeout: fc
                .tts
                .timeout_secs
                .map_or(defaults.tts.timeout, Duration::from_secs),
        };

        let mode = match env("SPARKBOT_MODE").or(fc.pipeline.mode) {
            Some(s) => s.parse::<PipelineMode>()?,
            None => defaults.pipeline.mode,
        };
        let pipeline = PipelineConfig {
            mode,
            text_queue: fc
                .pipeline
                .text_queue
                .unwrap_or(defaults.pipeline.text_queue),
            playback_timeout: fc
                .pipeline
                .playback_timeout_ms
                .map_or(defaults.pipeline.playback_timeout, Duration::from_millis),
            look_delay: fc
                .pipeline
                .look_delay_ms
                .map_or(defaults.pipeline.look_delay, Duration::from_millis),
        };

        let clips = ClipsConfig {
            wake: fc.clips.wake,
            chime: fc.clips.chime,
        };

        let config = Self {
            audio,
            capture,
            detector,
            stt,
            chat,
            tts,
            pipeline,
            clips,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first inconsistency found
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be non-zero".to_string()));
        }
        if self.capture.min_duration > self.capture.max_duration {
            return Err(Error::Config(
                "capture.min_ms must not exceed capture.max_ms".to_string(),
            ));
        }
        if self.detector.silence_polls == 0 {
            return Err(Error::Config(
                "detector.silence_polls must be at least 1".to_string(),
            ));
        }
        if self.pipeline.text_queue == 0 {
            return Err(Error::Config(
                "pipeline.text_queue must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
