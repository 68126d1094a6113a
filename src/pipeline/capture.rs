//! Utterance capture buffer
//!
//! Written by the feed worker, started and finished by the recording
//! coordinator. The capturing flag lives under the same lock as the bytes,
//! so a frame is either fully part of an utterance or not at all.

use std::sync::{Mutex, MutexGuard};

/// Result of appending one microphone frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// Not capturing; the frame was ignored
    Idle,
    /// Frame stored (possibly truncated at the cap)
    Stored,
    /// The buffer just reached its cap and no overflow completion has been
    /// signalled yet
    Full,
}

/// Result of finishing a capture
#[derive(Debug, PartialEq, Eq)]
pub enum Finished {
    /// Long enough to transcribe; holds a copy of the bytes
    Ready(Vec<u8>),
    /// Too short to be speech; discarded
    TooShort(usize),
    /// No capture was in progress
    NotCapturing,
}

#[derive(Debug)]
struct Utterance {
    data: Vec<u8>,
    capturing: bool,
    overflow_signalled: bool,
    overflows: u64,
}

/// Fixed-capacity PCM16LE buffer for one utterance
#[derive(Debug)]
pub struct CaptureBuffer {
    inner: Mutex<Utterance>,
    max_bytes: usize,
    min_bytes: usize,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `max_bytes`; utterances must exceed
    /// `min_bytes` to be kept
    #[must_use]
    pub fn new(max_bytes: usize, min_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Utterance {
                data: Vec::with_capacity(max_bytes),
                capturing: false,
                overflow_signalled: false,
                overflows: 0,
            }),
            max_bytes,
            min_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Utterance> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Begin a new utterance, discarding whatever was there
    pub fn start(&self) {
        let mut u = self.lock();
        u.data.clear();
        u.capturing = true;
        u.overflow_signalled = false;
        tracing::debug!("capture started");
    }

    /// Append one little-endian frame, clamped to the remaining capacity
    pub fn append(&self, frame: &[u8]) -> Append {
        let mut u = self.lock();
        if !u.capturing {
            return Append::Idle;
        }

        let before = u.data.len();
        let room = self.max_bytes.saturating_sub(before);
        let take = frame.len().min(room);
        u.data.extend_from_slice(&frame[..take]);
        if before < self.max_bytes && u.data.len() >= self.max_bytes {
            u.overflows += 1;
        }

        if u.data.len() >= self.max_bytes && !u.overflow_signalled {
            Append::Full
        } else {
            Append::Stored
        }
    }

    /// Record that the synthetic end-of-speech for this utterance went out
    pub fn mark_overflow_signalled(&self) {
        self.lock().overflow_signalled = true;
    }

    /// Stop capturing and hand back the utterance if it is long enough
    pub fn finish(&self) -> Finished {
        let mut u = self.lock();
        if !u.capturing {
            return Finished::NotCapturing;
        }
        u.capturing = false;

        let len = u.data.len();
        if len > self.min_bytes {
            Finished::Ready(u.data.clone())
        } else {
            Finished::TooShort(len)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    /// Number of captures that have hit the cap so far
    ///
    /// Only ever increases; finishing a capture does not reset it.
    #[must_use]
    pub fn overflows(&self) -> u64 {
        self.lock().overflows
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    #[must_use]
    pub const fn min_bytes(&self) -> usize {
        self.min_bytes
    }
}
