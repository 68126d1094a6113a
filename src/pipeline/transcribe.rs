//! STT stage: captured utterances to text

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{mpsc, watch};

use super::channels::forward_text;
use super::context::{PipelineContext, PipelineMode};
use crate::face::FaceEvent;
use crate::voice::SpeechToText;

/// Transcribe each raised utterance and route the text by mode
///
/// Every round trip, successful or not, bumps `completions`.
pub async fn run(
    ctx: Arc<PipelineContext>,
    stt: Arc<dyn SpeechToText>,
    chat_tx: mpsc::Sender<String>,
    completions: watch::Sender<u64>,
) {
    tracing::info!("STT stage started");

    while let Some(pcm) = ctx.utterance_ready.wait().await {
        let result = stt.transcribe(&pcm).await;
        drop(pcm);

        match result {
            Ok(text) => match ctx.mode.get() {
                PipelineMode::Chat => {
                    forward_text(&chat_tx, text, &ctx.stats, "chat");
                }
                mode => tracing::info!(%mode, transcript = %text, "transcript not routed"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                ctx.faces.send(FaceEvent::Look);
            }
        }

        ctx.stats.stt_round_trips.fetch_add(1, Ordering::Relaxed);
        completions.send_modify(|n| *n += 1);
    }

    tracing::info!("STT stage stopped");
}
