//! TTS stage: replies to speaker audio
//!
//! Synthesized audio is pulled chunk by chunk and handed to the playback
//! worker, waiting for it (bounded) so a long reply never queues up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};

use super::channels::AudioChunk;
use super::context::PipelineContext;
use crate::face::FaceEvent;
use crate::voice::{SpeechStream, TextToSpeech};

/// Timing for the TTS stage
#[derive(Debug, Clone, Copy)]
pub struct SpeakTiming {
    /// Longest wait for the playback worker to take a chunk
    pub playback_timeout: Duration,
    /// Pause after a reply before the face reverts to look
    pub look_delay: Duration,
}

/// How one reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Interrupted,
    PlaybackClosed,
}

/// Synthesize and play each reply in turn
pub async fn run(
    ctx: Arc<PipelineContext>,
    tts: Arc<dyn TextToSpeech>,
    mut replies: mpsc::Receiver<String>,
    audio_tx: mpsc::Sender<AudioChunk>,
    timing: SpeakTiming,
) {
    tracing::info!("TTS stage started");

    while let Some(text) = replies.recv().await {
        ctx.set_speaking(true);
        let stream = tts.synthesize(&text).await;
        drop(text);

        let outcome = match stream {
            Ok(mut stream) => speak(&ctx, stream.as_mut(), &audio_tx, timing).await,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                Outcome::Finished
            }
        };

        ctx.set_speaking(false);
        if outcome == Outcome::PlaybackClosed {
            break;
        }

        tokio::time::sleep(timing.look_delay).await;
        if !ctx.is_speaking() {
            ctx.faces.send(FaceEvent::Look);
        }
    }

    tracing::info!("TTS stage stopped");
}

async fn speak(
    ctx: &PipelineContext,
    stream: &mut dyn SpeechStream,
    audio_tx: &mpsc::Sender<AudioChunk>,
    timing: SpeakTiming,
) -> Outcome {
    let mut chunks = 0usize;

    let outcome = loop {
        if !ctx.is_speaking() {
            tracing::info!(chunks, "reply interrupted");
            break Outcome::Interrupted;
        }

        let chunk = match stream.recv().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break Outcome::Finished,
            Err(e) => {
                tracing::warn!(error = %e, chunks, "speech stream failed");
                break Outcome::Finished;
            }
        };

        if chunks == 0 {
            ctx.faces.send(FaceEvent::Speak);
        }
        chunks += 1;

        match audio_tx.send_timeout(chunk, timing.playback_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!(
                    timeout_ms = timing.playback_timeout.as_millis(),
                    "playback stalled, abandoning reply"
                );
                break Outcome::Interrupted;
            }
            Err(SendTimeoutError::Closed(_)) => break Outcome::PlaybackClosed,
        }
    };

    stream.close();
    tracing::debug!(chunks, ?outcome, "reply done");
    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;
    use crate::face::FaceEvents;
    use crate::pipeline::capture::CaptureBuffer;
    use crate::pipeline::context::PipelineMode;
    use crate::{Error, Result};

    struct Canned(VecDeque<Vec<u8>>);

    #[async_trait]
    impl SpeechStream for Canned {
        async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.pop_front())
        }
    }

    /// Each character becomes one chunk
    struct Spell;

    #[async_trait]
    impl TextToSpeech for Spell {
        async fn synthesize(&self, text: &str) -> Result<Box<dyn SpeechStream>> {
            if text.is_empty() {
                return Err(Error::Tts("nothing to say".to_string()));
            }
            Ok(Box::new(Canned(text.bytes().map(|b| vec![b]).collect())))
        }
    }

    fn context() -> Arc<PipelineContext> {
        Arc::new(PipelineContext::new(
            CaptureBuffer::new(16, 0),
            PipelineMode::Chat,
            FaceEvents::new(),
        ))
    }

    fn timing() -> SpeakTiming {
        SpeakTiming {
            playback_timeout: Duration::from_millis(50),
            look_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_chunks_reach_playback_in_order() {
        let ctx = context();
        let mut faces = ctx.faces.subscribe();
        let (tx, rx) = mpsc::channel(1);
        let (audio_tx, mut audio_rx) = mpsc::channel(8);

        tx.send("abc".to_string()).await.unwrap();
        drop(tx);
        run(Arc::clone(&ctx), Arc::new(Spell), rx, audio_tx, timing()).await;

        let mut got = Vec::new();
        while let Some(chunk) = audio_rx.recv().await {
            got.push(chunk);
        }
        assert_eq!(got, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert!(!ctx.is_speaking());

        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Speak);
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Look);
        assert!(faces.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_synthesis_error_reverts_face() {
        let ctx = context();
        let mut faces = ctx.faces.subscribe();
        let (tx, rx) = mpsc::channel(1);
        let (audio_tx, mut audio_rx) = mpsc::channel(8);

        tx.send(String::new()).await.unwrap();
        drop(tx);
        run(Arc::clone(&ctx), Arc::new(Spell), rx, audio_tx, timing()).await;

        assert!(audio_rx.recv().await.is_none());
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Look);
    }

    #[tokio::test]
    async fn test_stalled_playback_abandons_reply() {
        let ctx = context();
        let (audio_tx, mut audio_rx) = mpsc::channel(1);
        let mut stream = Canned(vec![vec![1], vec![2], vec![3]].into());

        ctx.set_speaking(true);
        let outcome = speak(&ctx, &mut stream, &audio_tx, timing()).await;

        assert_eq!(outcome, Outcome::Interrupted);
        assert_eq!(audio_rx.try_recv().unwrap(), vec![1]);
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_barge_in_stops_before_next_chunk() {
        let ctx = context();
        let (audio_tx, mut audio_rx) = mpsc::channel(8);
        let mut stream = Canned(vec![vec![1], vec![2]].into());

        ctx.set_speaking(false);
        let outcome = speak(&ctx, &mut stream, &audio_tx, timing()).await;

        assert_eq!(outcome, Outcome::Interrupted);
        assert!(audio_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_playback_gone_stops_stage() {
        let ctx = context();
        let (tx, rx) = mpsc::channel(2);
        let (audio_tx, audio_rx) = mpsc::channel(1);
        drop(audio_rx);

        tx.send("ab".to_string()).await.unwrap();
        tx.send("cd".to_string()).await.unwrap();
        run(Arc::clone(&ctx), Arc::new(Spell), rx, audio_tx, timing()).await;

        // Returned while `tx` is still alive
        assert!(!ctx.is_speaking());
        drop(tx);
    }
}
