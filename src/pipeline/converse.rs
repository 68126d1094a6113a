//! Chat stage: transcripts to replies

use std::sync::Arc;

use tokio::sync::mpsc;

use super::channels::forward_text;
use super::context::{PipelineContext, PipelineMode};
use crate::face::FaceEvent;
use crate::voice::ChatModel;

/// Complete each inbound text and forward replies to TTS in chat mode
pub async fn run(
    ctx: Arc<PipelineContext>,
    chat: Arc<dyn ChatModel>,
    mut texts: mpsc::Receiver<String>,
    tts_tx: mpsc::Sender<String>,
) {
    tracing::info!("chat stage started");

    while let Some(text) = texts.recv().await {
        tracing::info!(text = %text, "chat request");
        let reply = chat.complete(&text).await;
        drop(text);

        match reply {
            Ok(reply) if ctx.mode.get() == PipelineMode::Chat => {
                forward_text(&tts_tx, reply, &ctx.stats, "tts");
            }
            Ok(reply) => {
                tracing::info!(mode = %ctx.mode.get(), reply = %reply, "reply not spoken");
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                ctx.faces.send(FaceEvent::Look);
            }
        }
    }

    tracing::info!("chat stage stopped");
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::face::FaceEvents;
    use crate::pipeline::capture::CaptureBuffer;
    use crate::{Error, Result};

    struct Shout;

    #[async_trait]
    impl ChatModel for Shout {
        async fn complete(&self, text: &str) -> Result<String> {
            if text == "fail" {
                return Err(Error::Chat("chat API error 500".to_string()));
            }
            Ok(text.to_uppercase())
        }
    }

    fn context(mode: PipelineMode) -> Arc<PipelineContext> {
        Arc::new(PipelineContext::new(
            CaptureBuffer::new(16, 0),
            mode,
            FaceEvents::new(),
        ))
    }

    #[tokio::test]
    async fn test_reply_forwarded() {
        let ctx = context(PipelineMode::Chat);
        let (tx, rx) = mpsc::channel(4);
        let (tts_tx, mut tts_rx) = mpsc::channel(4);

        tx.send("hello".to_string()).await.unwrap();
        drop(tx);
        run(ctx, Arc::new(Shout), rx, tts_tx).await;

        assert_eq!(tts_rx.recv().await.unwrap(), "HELLO");
        assert!(tts_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_error_sends_single_look() {
        let ctx = context(PipelineMode::Chat);
        let mut faces = ctx.faces.subscribe();
        let (tx, rx) = mpsc::channel(4);
        let (tts_tx, mut tts_rx) = mpsc::channel(4);

        tx.send("fail".to_string()).await.unwrap();
        drop(tx);
        run(ctx, Arc::new(Shout), rx, tts_tx).await;

        assert!(tts_rx.recv().await.is_none());
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Look);
        assert!(faces.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_image_mode_keeps_reply() {
        let ctx = context(PipelineMode::Image);
        let (tx, rx) = mpsc::channel(4);
        let (tts_tx, mut tts_rx) = mpsc::channel(4);

        tx.send("draw a cat".to_string()).await.unwrap();
        drop(tx);
        run(ctx, Arc::new(Shout), rx, tts_tx).await;

        assert!(tts_rx.recv().await.is_none());
    }
}
