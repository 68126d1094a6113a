//! Recording coordinator: the single consumer of pipeline events

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc::{self, error::TrySendError};

use super::capture::Finished;
use super::channels::{AudioChunk, PipelineEvent};
use super::context::PipelineContext;
use crate::voice::{Clips, pcm_duration};

/// Drives the capture buffer and acknowledgement clips from events
pub struct Recorder {
    ctx: Arc<PipelineContext>,
    clips: Clips,
    audio_tx: mpsc::Sender<AudioChunk>,
    sample_rate: u32,
}

impl Recorder {
    #[must_use]
    pub fn new(
        ctx: Arc<PipelineContext>,
        clips: Clips,
        audio_tx: mpsc::Sender<AudioChunk>,
        sample_rate: u32,
    ) -> Self {
        Self {
            ctx,
            clips,
            audio_tx,
            sample_rate,
        }
    }

    /// Consume events until every producer is gone, then release STT
    pub fn run(self, mut events: mpsc::Receiver<PipelineEvent>) {
        tracing::info!("recording coordinator started");
        while let Some(event) = events.blocking_recv() {
            self.handle(event);
        }
        self.ctx.utterance_ready.close();
        tracing::info!("recording coordinator stopped");
    }

    pub fn handle(&self, event: PipelineEvent) {
        tracing::debug!(%event, "handling event");
        match event {
            PipelineEvent::PlayChime => {
                self.interrupt_reply();
                self.play(&self.clips.chime, "chime");
            }
            PipelineEvent::WakenetStart => {
                self.interrupt_reply();
                self.play(&self.clips.wake, "wake");
            }
            PipelineEvent::WakenetEnd => {
                tracing::info!("listen window closed without speech");
            }
            PipelineEvent::VadStart => self.ctx.capture.start(),
            PipelineEvent::VadEnd => self.finish_capture(),
        }
    }

    fn finish_capture(&self) {
        match self.ctx.capture.finish() {
            Finished::Ready(pcm) => {
                tracing::info!(
                    bytes = pcm.len(),
                    duration_ms = pcm_duration(self.sample_rate, pcm.len()).as_millis(),
                    "utterance captured"
                );
                self.ctx.utterance_ready.raise(pcm);
            }
            Finished::TooShort(len) => {
                self.ctx
                    .stats
                    .utterances_discarded
                    .fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    bytes = len,
                    min_bytes = self.ctx.capture.min_bytes(),
                    "utterance too short, discarding"
                );
            }
            Finished::NotCapturing => tracing::debug!("end of speech without a capture"),
        }
    }

    /// Barge-in: a wake or chime cuts off the reply in progress
    fn interrupt_reply(&self) {
        if self.ctx.is_speaking() {
            tracing::info!("interrupting reply");
            self.ctx.set_speaking(false);
        }
    }

    fn play(&self, clip: &[u8], name: &'static str) {
        if clip.is_empty() {
            return;
        }
        match self.audio_tx.try_send(clip.to_vec()) {
            Ok(()) => tracing::debug!(clip = name, bytes = clip.len(), "clip queued"),
            Err(TrySendError::Full(_)) => {
                tracing::debug!(clip = name, "playback busy, skipping clip");
            }
            Err(TrySendError::Closed(_)) => tracing::debug!(clip = name, "playback closed"),
        }
    }
}
