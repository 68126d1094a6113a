//! Feed worker: microphone frames into the detection engine and the capture
//! buffer

use std::sync::Arc;
use std::time::Duration;

use super::capture::Append;
use super::channels::{EventSender, PipelineEvent};
use super::context::PipelineContext;
use crate::voice::{AudioSource, DetectionEngine, pcm_to_bytes};

/// Back-off after a failed microphone read
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Pull frames until the source closes, then close the engine
pub fn run(
    mut source: Box<dyn AudioSource>,
    engine: Arc<dyn DetectionEngine>,
    ctx: Arc<PipelineContext>,
    events: EventSender,
) {
    let chunk = engine.feed_chunksize().max(1);
    let channels = engine.feed_channels().max(1);
    let mut frame = vec![0i16; chunk];
    let mut interleaved = Vec::with_capacity(chunk * channels);

    tracing::info!(chunk, channels, "feed worker started");

    loop {
        let n = match source.read(&mut frame) {
            Ok(0) => {
                tracing::info!("microphone closed");
                break;
            }
            Ok(n) => n.min(chunk),
            Err(e) => {
                tracing::warn!(error = %e, "microphone read failed");
                std::thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };

        if ctx.capture.append(&pcm_to_bytes(&frame[..n])) == Append::Full {
            tracing::info!(
                bytes = ctx.capture.max_bytes(),
                "capture buffer full, ending utterance"
            );
            if events.emit(PipelineEvent::VadEnd) {
                ctx.capture.mark_overflow_signalled();
            }
        }

        // A short final read is padded with silence
        frame[n..].fill(0);
        interleave(&frame, channels, &mut interleaved);
        engine.feed(&interleaved);
    }

    engine.close();
    tracing::info!("feed worker stopped");
}

/// Lay out mic samples as channel 0 of `channels`, reference channels zeroed
fn interleave(mic: &[i16], channels: usize, out: &mut Vec<i16>) {
    out.clear();
    if channels == 1 {
        out.extend_from_slice(mic);
        return;
    }
    for &sample in mic {
        out.push(sample);
        out.extend(std::iter::repeat_n(0, channels - 1));
    }
}
