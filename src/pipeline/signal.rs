//! Utterance-ready signal between the recording coordinator and STT
//!
//! Binary, not counting: raising while an utterance is already pending
//! replaces it, so at most one utterance waits for transcription.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Vec<u8>>,
    closed: bool,
}

/// Hands finished utterances from a worker thread to the STT task
#[derive(Debug, Default)]
pub struct UtteranceSignal {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl UtteranceSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publish an utterance; returns false if one was already waiting
    pub fn raise(&self, pcm: Vec<u8>) -> bool {
        let replaced = {
            let mut slot = self.lock();
            if slot.closed {
                return false;
            }
            slot.pending.replace(pcm).is_some()
        };
        if replaced {
            tracing::debug!("previous utterance not yet transcribed, replacing it");
        }
        self.notify.notify_one();
        !replaced
    }

    /// Wait for the next utterance; `None` once closed and drained
    pub async fn wait(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut slot = self.lock();
                if let Some(pcm) = slot.pending.take() {
                    return Some(pcm);
                }
                if slot.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wake the waiter for good
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }
}
