//! Energy-based detection engine
//!
//! Bundled stand-in for a neural wakeword engine. VAD is RMS energy per chunk.
//! While wakeword detection is armed, a speech burst of at least the configured
//! wake duration followed by silence counts as the wakeword; the following
//! fetch reports the channel as verified.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::config::DetectorConfig;
use crate::voice::codec::i16_to_f32;
use crate::voice::engine::{DetectionEngine, DetectionResult, VadState, WakeState};
use crate::{Error, Result};

/// Samples per feed/fetch chunk (32 ms at 16 kHz)
pub const CHUNK_SAMPLES: usize = 512;

/// Fed chunks kept before the oldest is dropped (about 4 s)
const MAX_PENDING_CHUNKS: usize = 128;

/// Channels per fed frame: microphone plus one reference channel
const FEED_CHANNELS: usize = 2;

/// State of the wake trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech burst in progress, accumulating
    Listening,
    /// Burst qualified as the wakeword; verification pending
    Triggered,
}

struct Inner {
    pending: VecDeque<Vec<i16>>,
    state: DetectorState,
    wakeword_enabled: bool,
    speech_samples: usize,
    silence_samples: usize,
    closed: bool,
}

/// Energy-threshold wakeword/VAD engine
pub struct EnergyEngine {
    threshold: f32,
    wake_samples: usize,
    silence_samples: usize,
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl EnergyEngine {
    /// Create an engine from detector tuning
    #[must_use]
    pub fn new(config: &DetectorConfig, sample_rate: u32) -> Self {
        let samples_for = |d: std::time::Duration| {
            usize::try_from(u128::from(sample_rate) * d.as_millis() / 1000).unwrap_or(usize::MAX)
        };

        tracing::debug!(
            threshold = config.energy_threshold,
            wake_ms = config.wake_duration.as_millis(),
            "energy engine initialized"
        );

        Self {
            threshold: config.energy_threshold,
            wake_samples: samples_for(config.wake_duration),
            // Same pause length that ends a burst ends a wake trigger
            silence_samples: samples_for(config.silence_poll) * 2,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                state: DetectorState::Idle,
                wakeword_enabled: true,
                speech_samples: 0,
                silence_samples: 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Current wake trigger state
    #[must_use]
    pub fn state(&self) -> DetectorState {
        self.lock().state
    }

    /// Whether wakeword detection is armed
    #[must_use]
    pub fn wakeword_enabled(&self) -> bool {
        self.lock().wakeword_enabled
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Classify one chunk and advance the wake trigger
    fn classify(&self, inner: &mut Inner, chunk: &[i16]) -> DetectionResult {
        let energy = calculate_energy(chunk);
        let vad = if energy > self.threshold {
            VadState::Speech
        } else {
            VadState::Silence
        };

        if inner.state == DetectorState::Triggered {
            inner.state = DetectorState::Idle;
            return DetectionResult::wake(WakeState::ChannelVerified, vad);
        }

        if !inner.wakeword_enabled {
            return DetectionResult::wake(WakeState::None, vad);
        }

        let wake = match inner.state {
            DetectorState::Idle => {
                if vad == VadState::Speech {
                    inner.state = DetectorState::Listening;
                    inner.speech_samples = chunk.len();
                    inner.silence_samples = 0;
                    tracing::trace!(energy, "speech burst started");
                }
                WakeState::None
            }
            DetectorState::Listening => {
                if vad == VadState::Speech {
                    inner.speech_samples += chunk.len();
                    inner.silence_samples = 0;
                    WakeState::None
                } else {
                    inner.silence_samples += chunk.len();
                    if inner.silence_samples < self.silence_samples {
                        WakeState::None
                    } else if inner.speech_samples >= self.wake_samples {
                        tracing::debug!(samples = inner.speech_samples, "wake burst complete");
                        inner.state = DetectorState::Triggered;
                        inner.speech_samples = 0;
                        inner.silence_samples = 0;
                        WakeState::WakewordDetected
                    } else {
                        tracing::trace!("burst too short - resetting");
                        inner.state = DetectorState::Idle;
                        inner.speech_samples = 0;
                        inner.silence_samples = 0;
                        WakeState::None
                    }
                }
            }
            DetectorState::Triggered => WakeState::None,
        };

        DetectionResult::wake(wake, vad)
    }
}

impl DetectionEngine for EnergyEngine {
    fn feed(&self, pcm: &[i16]) {
        // Keep only the microphone channel of the interleaved frame
        let mic: Vec<i16> = pcm.iter().step_by(FEED_CHANNELS).copied().collect();

        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        if inner.pending.len() >= MAX_PENDING_CHUNKS {
            inner.pending.pop_front();
            tracing::warn!("detection backlog full, dropping oldest chunk");
        }
        inner.pending.push_back(mic);
        drop(inner);

        self.ready.notify_one();
    }

    fn fetch(&self) -> Result<Option<DetectionResult>> {
        let mut inner = self
            .ready
            .wait_while(self.lock(), |i| i.pending.is_empty() && !i.closed)
            .map_err(|_| Error::Engine("engine state poisoned".to_string()))?;

        let Some(chunk) = inner.pending.pop_front() else {
            return Ok(None);
        };

        Ok(Some(self.classify(&mut inner, &chunk)))
    }

    fn enable_wakeword(&self) {
        let mut inner = self.lock();
        inner.wakeword_enabled = true;
        inner.state = DetectorState::Idle;
        inner.speech_samples = 0;
        inner.silence_samples = 0;
    }

    fn disable_wakeword(&self) {
        self.lock().wakeword_enabled = false;
    }

    fn feed_chunksize(&self) -> usize {
        CHUNK_SAMPLES
    }

    fn fetch_chunksize(&self) -> usize {
        CHUNK_SAMPLES
    }

    fn feed_channels(&self) -> usize {
        FEED_CHANNELS
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let f = i16_to_f32(s);
            f * f
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
