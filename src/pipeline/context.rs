//! State shared by every pipeline worker

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use super::capture::CaptureBuffer;
use super::signal::UtteranceSignal;
use crate::face::FaceEvents;
use crate::{Error, Result};

/// Where a transcription or reply is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PipelineMode {
    /// Transcripts are discarded
    Idle = 0,
    /// Transcripts go to chat, replies are spoken
    #[default]
    Chat = 1,
    /// Reserved for an image-generation route; transcripts are discarded
    Image = 2,
}

impl PipelineMode {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Chat,
            2 => Self::Image,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Chat => write!(f, "chat"),
            Self::Image => write!(f, "image"),
        }
    }
}

impl FromStr for PipelineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "chat" => Ok(Self::Chat),
            "image" => Ok(Self::Image),
            other => Err(Error::Config(format!(
                "unknown pipeline mode '{other}' (expected idle, chat, or image)"
            ))),
        }
    }
}

/// Process-wide routing mode, readable from any worker without locking
#[derive(Debug)]
pub struct ModeSwitch(AtomicU8);

impl ModeSwitch {
    #[must_use]
    pub const fn new(mode: PipelineMode) -> Self {
        Self(AtomicU8::new(mode as u8))
    }

    #[must_use]
    pub fn get(&self) -> PipelineMode {
        PipelineMode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: PipelineMode) {
        let previous = PipelineMode::from_u8(self.0.swap(mode as u8, Ordering::AcqRel));
        if previous != mode {
            tracing::info!(from = %previous, to = %mode, "pipeline mode changed");
        }
    }
}

/// Counters for everything the pipeline drops on purpose
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub events_dropped: AtomicU64,
    pub texts_dropped: AtomicU64,
    pub utterances_discarded: AtomicU64,
    pub stt_round_trips: AtomicU64,
}

impl PipelineStats {
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            texts_dropped: self.texts_dropped.load(Ordering::Relaxed),
            utterances_discarded: self.utterances_discarded.load(Ordering::Relaxed),
            stt_round_trips: self.stt_round_trips.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub events_dropped: u64,
    pub texts_dropped: u64,
    pub utterances_discarded: u64,
    pub stt_round_trips: u64,
}

/// Everything the workers share, held behind one `Arc`
#[derive(Debug)]
pub struct PipelineContext {
    /// Utterance capture buffer
    pub capture: CaptureBuffer,

    /// Raised when a finished utterance is ready for STT
    pub utterance_ready: UtteranceSignal,

    /// Current routing mode
    pub mode: ModeSwitch,

    /// True while a reply is being synthesized and played
    pub speaking: AtomicBool,

    pub stats: Arc<PipelineStats>,

    pub faces: FaceEvents,
}

impl PipelineContext {
    #[must_use]
    pub fn new(capture: CaptureBuffer, mode: PipelineMode, faces: FaceEvents) -> Self {
        Self {
            capture,
            utterance_ready: UtteranceSignal::new(),
            mode: ModeSwitch::new(mode),
            speaking: AtomicBool::new(false),
            stats: Arc::new(PipelineStats::default()),
            faces,
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Release);
    }
}
