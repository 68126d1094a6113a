//! Inter-worker channels
//!
//! Pipeline events travel on a single-slot channel whose producers never
//! block: a full slot drops the new event, since the detector re-derives its
//! state every cycle. Text channels are bounded and best-effort: a full
//! channel drops the text. Only the audio channel applies backpressure.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::context::PipelineStats;

/// Capacity of the pipeline event channel
pub const EVENT_SLOTS: usize = 1;

/// Capacity of the playback channel
pub const AUDIO_SLOTS: usize = 1;

/// One slice of PCM16LE audio on its way to the speaker
pub type AudioChunk = Vec<u8>;

/// Discrete pipeline state change delivered to the recording coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Wakeword heard; listening for speech
    WakenetStart,
    /// No speech followed the wakeword in time
    WakenetEnd,
    /// Speech began; start capturing
    VadStart,
    /// Speech ended or the buffer filled; stop capturing
    VadEnd,
    /// Play the acknowledgement chime
    PlayChime,
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WakenetStart => write!(f, "wakenet-start"),
            Self::WakenetEnd => write!(f, "wakenet-end"),
            Self::VadStart => write!(f, "vad-start"),
            Self::VadEnd => write!(f, "vad-end"),
            Self::PlayChime => write!(f, "play-chime"),
        }
    }
}

/// Non-blocking producer side of the event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
}

impl EventSender {
    /// Try to enqueue `event`; returns whether it was accepted
    ///
    /// Never blocks. An unconsumed previous event causes this one to be
    /// dropped and counted.
    pub fn emit(&self, event: PipelineEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                tracing::trace!(%event, "event sent");
                true
            }
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.events_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(%event, dropped, "event slot full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::debug!(%event, "event channel closed");
                false
            }
        }
    }
}

/// Create the single-slot event channel
#[must_use]
pub fn event_channel(stats: Arc<PipelineStats>) -> (EventSender, mpsc::Receiver<PipelineEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_SLOTS);
    (EventSender { tx, stats }, rx)
}

/// Best-effort hand-off of a text message
///
/// Ownership moves into the channel on success; on a full or closed channel
/// the text is dropped here and the caller moves on.
pub fn forward_text(
    tx: &mpsc::Sender<String>,
    text: String,
    stats: &PipelineStats,
    stage: &'static str,
) -> bool {
    match tx.try_send(text) {
        Ok(()) => true,
        Err(TrySendError::Full(text)) => {
            stats.texts_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(stage, chars = text.len(), "text channel full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(stage, "text channel closed");
            false
        }
    }
}
