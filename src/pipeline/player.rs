//! Playback worker: sole writer to the speaker

use tokio::sync::mpsc;

use super::channels::AudioChunk;
use crate::voice::AudioSink;

/// Write chunks in arrival order until every sender is gone
pub fn run(mut sink: Box<dyn AudioSink>, mut chunks: mpsc::Receiver<AudioChunk>) {
    tracing::info!("playback worker started");
    while let Some(chunk) = chunks.blocking_recv() {
        match sink.write(&chunk) {
            Ok(written) if written < chunk.len() => {
                tracing::debug!(written, bytes = chunk.len(), "short speaker write");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, bytes = chunk.len(), "speaker write failed"),
        }
    }
    tracing::info!("playback worker stopped");
}
