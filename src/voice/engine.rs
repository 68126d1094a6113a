//! Detection engine interface
//!
//! The wakeword/VAD engine is a black box: raw PCM goes in through `feed`,
//! one classification per detection cycle comes out of `fetch`. Feed and fetch
//! are called from different workers, so implementations synchronize internally.

use crate::Result;

/// Wakeword classification of a detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeState {
    /// Nothing heard
    #[default]
    None,
    /// Wakeword detected on some channel
    WakewordDetected,
    /// Wakeword confirmed on the microphone channel
    ChannelVerified,
}

/// Voice-activity classification of a detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Silence,
    Speech,
}

/// Result of one detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionResult {
    pub wake: WakeState,
    pub vad: VadState,
}

impl DetectionResult {
    /// Plain silence
    #[must_use]
    pub const fn silence() -> Self {
        Self {
            wake: WakeState::None,
            vad: VadState::Silence,
        }
    }

    /// Plain speech
    #[must_use]
    pub const fn speech() -> Self {
        Self {
            wake: WakeState::None,
            vad: VadState::Speech,
        }
    }

    /// Wake event with the given VAD state
    #[must_use]
    pub const fn wake(wake: WakeState, vad: VadState) -> Self {
        Self { wake, vad }
    }

    #[must_use]
    pub fn is_speech(&self) -> bool {
        self.vad == VadState::Speech
    }
}

/// Wakeword/VAD detection engine
pub trait DetectionEngine: Send + Sync {
    /// Push one interleaved feed chunk (`feed_chunksize() * feed_channels()` samples)
    fn feed(&self, pcm: &[i16]);

    /// Block until the next detection cycle completes
    ///
    /// Returns `Ok(None)` once the engine is closed.
    ///
    /// # Errors
    ///
    /// Returns error if the cycle failed; the caller retries
    fn fetch(&self) -> Result<Option<DetectionResult>>;

    /// Re-arm wakeword detection
    fn enable_wakeword(&self);

    /// Suspend wakeword detection (VAD keeps running)
    fn disable_wakeword(&self);

    /// Samples per channel expected by `feed`
    fn feed_chunksize(&self) -> usize;

    /// Samples consumed per `fetch`
    fn fetch_chunksize(&self) -> usize;

    /// Channels per fed frame (microphone first, then reference channels)
    fn feed_channels(&self) -> usize {
        1
    }

    /// Stop the engine; pending and future fetches return `Ok(None)`
    fn close(&self) {}
}
