//! Voice pipeline
//!
//! Audio-critical workers run on dedicated threads, network stages run as
//! tokio tasks, and the two sides meet on bounded channels:
//!
//! ```text
//!  mic ─▶ feed ─▶ engine ─▶ detector ──events(1)──▶ recorder ──▶ speaker
//!           │                                          │  ▲clips     ▲
//!           └──────────── capture buffer ◀─────────────┘  │          │
//!                                                      signal        │
//!                                                         ▼          │
//!                        STT ──text(16)──▶ chat ──text(16)──▶ TTS ─audio(1)
//! ```
//!
//! When the microphone closes the shutdown cascades stage by stage: feed
//! closes the engine, the detector sees the engine close, the recorder sees
//! the event channel close and releases STT, and each text channel closes
//! behind the stage that owned its sender.

mod capture;
mod channels;
mod context;
mod converse;
mod detector;
mod feed;
mod player;
mod recorder;
mod signal;
mod speak;
mod transcribe;

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{broadcast, mpsc, watch};

pub use capture::{Append, CaptureBuffer, Finished};
pub use channels::{AUDIO_SLOTS, AudioChunk, EVENT_SLOTS, EventSender, PipelineEvent};
pub use context::{ModeSwitch, PipelineContext, PipelineMode, PipelineStats, StatsSnapshot};
pub use detector::{Detector, Phase};
pub use recorder::Recorder;
pub use signal::UtteranceSignal;
pub use speak::SpeakTiming;

use crate::config::Config;
use crate::face::{FaceEvent, FaceEvents};
use crate::voice::{
    AudioSink, AudioSource, ChatModel, Clips, DetectionEngine, SpeechToText, TextToSpeech,
};
use crate::{Error, Result};

/// Host audio endpoints and the detection engine
pub struct Devices {
    pub source: Box<dyn AudioSource>,
    pub sink: Box<dyn AudioSink>,
    pub engine: Arc<dyn DetectionEngine>,
}

/// Remote service clients
#[derive(Clone)]
pub struct Services {
    pub stt: Arc<dyn SpeechToText>,
    pub chat: Arc<dyn ChatModel>,
    pub tts: Arc<dyn TextToSpeech>,
}

/// Pipeline builder
pub struct Pipeline {
    config: Config,
    clips: Clips,
    faces: FaceEvents,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: Config, clips: Clips) -> Self {
        Self {
            config,
            clips,
            faces: FaceEvents::new(),
        }
    }

    /// Publish face events on an existing channel
    #[must_use]
    pub fn with_faces(mut self, faces: FaceEvents) -> Self {
        self.faces = faces;
        self
    }

    /// Start every worker
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if a worker thread cannot be spawned
    pub fn spawn(self, devices: Devices, services: Services) -> Result<PipelineHandle> {
        let Self {
            config,
            clips,
            faces,
        } = self;
        let rate = config.audio.sample_rate;

        let ctx = Arc::new(PipelineContext::new(
            CaptureBuffer::new(
                config.capture.max_bytes(rate),
                config.capture.min_bytes(rate),
            ),
            config.pipeline.mode,
            faces,
        ));
        ctx.faces.send(FaceEvent::Look);

        let (events, events_rx) = channels::event_channel(Arc::clone(&ctx.stats));
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_SLOTS);
        let queue = config.pipeline.text_queue.max(1);
        let (chat_tx, chat_rx) = mpsc::channel(queue);
        let (tts_tx, tts_rx) = mpsc::channel(queue);
        let (done_tx, done_rx) = watch::channel(0u64);

        let Devices {
            source,
            sink,
            engine,
        } = devices;

        let mut threads = Vec::with_capacity(4);

        threads.push(spawn_thread("audio-play", move || player::run(sink, audio_rx))?);

        let recorder = Recorder::new(Arc::clone(&ctx), clips, audio_tx.clone(), rate);
        threads.push(spawn_thread("audio-record", move || {
            recorder.run(events_rx);
        })?);

        let detector = Detector::new(
            Arc::clone(&engine),
            Arc::clone(&ctx),
            events.clone(),
            &config.detector,
        );
        threads.push(spawn_thread("audio-detect", move || detector.run())?);

        {
            let ctx = Arc::clone(&ctx);
            let events = events.clone();
            threads.push(spawn_thread("audio-feed", move || {
                feed::run(source, engine, ctx, events);
            })?);
        }

        let timing = SpeakTiming {
            playback_timeout: config.pipeline.playback_timeout,
            look_delay: config.pipeline.look_delay,
        };
        let tasks = vec![
            tokio::spawn(transcribe::run(
                Arc::clone(&ctx),
                services.stt,
                chat_tx.clone(),
                done_tx,
            )),
            tokio::spawn(converse::run(
                Arc::clone(&ctx),
                services.chat,
                chat_rx,
                tts_tx,
            )),
            tokio::spawn(speak::run(
                Arc::clone(&ctx),
                services.tts,
                tts_rx,
                audio_tx,
                timing,
            )),
        ];

        tracing::info!(
            sample_rate = rate,
            mode = %config.pipeline.mode,
            max_capture_ms = config.capture.max_duration.as_millis(),
            "pipeline started"
        );

        Ok(PipelineHandle {
            ctx,
            events,
            chat_tx,
            completions: done_rx,
            threads,
            tasks,
        })
    }
}

fn spawn_thread<F>(name: &str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| Error::Audio(format!("failed to spawn {name} thread: {e}")))
}

/// Control surface of a running pipeline
pub struct PipelineHandle {
    ctx: Arc<PipelineContext>,
    events: EventSender,
    chat_tx: mpsc::Sender<String>,
    completions: watch::Receiver<u64>,
    threads: Vec<JoinHandle<()>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Ask the coordinator to play the chime; false if the event was dropped
    pub fn play_chime(&self) -> bool {
        self.events.emit(PipelineEvent::PlayChime)
    }

    /// Feed text straight into the chat stage, bypassing STT
    pub fn inject_text(&self, text: impl Into<String>) -> bool {
        channels::forward_text(&self.chat_tx, text.into(), &self.ctx.stats, "chat")
    }

    pub fn set_mode(&self, mode: PipelineMode) {
        self.ctx.mode.set(mode);
    }

    #[must_use]
    pub fn mode(&self) -> PipelineMode {
        self.ctx.mode.get()
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.ctx.is_speaking()
    }

    /// Subscribe to face events
    #[must_use]
    pub fn faces(&self) -> broadcast::Receiver<FaceEvent> {
        self.ctx.faces.subscribe()
    }

    /// Count of finished STT round trips, successful or not
    #[must_use]
    pub fn stt_completions(&self) -> watch::Receiver<u64> {
        self.completions.clone()
    }

    /// Wait for every worker to stop and return the final counters
    ///
    /// The workers stop once the microphone closes; this only releases the
    /// handle's own senders and waits for the cascade.
    pub async fn join(self) -> StatsSnapshot {
        let Self {
            ctx,
            events,
            chat_tx,
            threads,
            tasks,
            ..
        } = self;
        drop(events);
        drop(chat_tx);

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "pipeline task failed");
            }
        }

        for thread in threads {
            let name = thread.thread().name().unwrap_or("worker").to_string();
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => tracing::debug!(thread = %name, "worker joined"),
                Ok(Err(_)) => tracing::error!(thread = %name, "worker panicked"),
                Err(e) => tracing::error!(thread = %name, error = %e, "join failed"),
            }
        }

        let stats = ctx.stats.snapshot();
        tracing::info!(
            events_dropped = stats.events_dropped,
            texts_dropped = stats.texts_dropped,
            utterances_discarded = stats.utterances_discarded,
            stt_round_trips = stats.stt_round_trips,
            "pipeline stopped"
        );
        stats
    }
}
