//! Detector worker: turns engine results into pipeline events
//!
//! ```text
//!  Idle ──wakeword/verified──▶ WaitingForSpeech ──speech──▶ Capturing
//!   ▲                               │                          │
//!   └──────── listen timeout ───────┘                          │
//!   └──────── confirmed silence / buffer full ─────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::channels::{EventSender, PipelineEvent};
use super::context::PipelineContext;
use crate::config::DetectorConfig;
use crate::face::FaceEvent;
use crate::voice::{DetectionEngine, DetectionResult, WakeState};

/// Detector phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the wakeword
    Idle,
    /// Wakeword verified, waiting for speech to begin
    WaitingForSpeech { since: Instant },
    /// Speech in progress
    Capturing,
}

/// Single consumer of the detection engine's results
pub struct Detector {
    engine: Arc<dyn DetectionEngine>,
    ctx: Arc<PipelineContext>,
    events: EventSender,
    silence_poll: Duration,
    silence_polls: u32,
    listen_timeout: Duration,
    phase: Phase,
    announced: bool,
    /// Capture overflow count when the current utterance began
    overflows_at_start: u64,
}

impl Detector {
    #[must_use]
    pub fn new(
        engine: Arc<dyn DetectionEngine>,
        ctx: Arc<PipelineContext>,
        events: EventSender,
        config: &DetectorConfig,
    ) -> Self {
        Self {
            engine,
            ctx,
            events,
            silence_poll: config.silence_poll,
            silence_polls: config.silence_polls,
            listen_timeout: config.listen_timeout,
            phase: Phase::Idle,
            announced: false,
            overflows_at_start: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Fetch and handle results until the engine closes
    pub fn run(mut self) {
        tracing::info!(
            fetch_chunk = self.engine.fetch_chunksize(),
            "detector started"
        );

        loop {
            match self.engine.fetch() {
                Ok(Some(result)) => {
                    if !self.step(result) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => tracing::warn!(error = %e, "detection fetch failed"),
            }
        }

        tracing::info!("detector stopped");
    }

    /// Handle one result; returns false once the engine has closed
    pub fn step(&mut self, result: DetectionResult) -> bool {
        if self.phase == Phase::Idle {
            match result.wake {
                WakeState::WakewordDetected => {
                    tracing::info!("wakeword detected");
                    self.announce();
                    return true;
                }
                WakeState::ChannelVerified => {
                    tracing::info!("wakeword channel verified");
                    self.engine.disable_wakeword();
                    if !self.announced {
                        self.announce();
                    }
                    self.announced = false;
                    self.phase = Phase::WaitingForSpeech {
                        since: Instant::now(),
                    };
                    return true;
                }
                WakeState::None => return true,
            }
        }

        match self.phase {
            Phase::Idle => true,
            Phase::WaitingForSpeech { since } => {
                if result.is_speech() {
                    tracing::info!("speech started");
                    self.overflows_at_start = self.ctx.capture.overflows();
                    self.events.emit(PipelineEvent::VadStart);
                    self.phase = Phase::Capturing;
                } else if since.elapsed() >= self.listen_timeout {
                    tracing::info!(
                        timeout_ms = self.listen_timeout.as_millis(),
                        "no speech after wakeword"
                    );
                    self.events.emit(PipelineEvent::WakenetEnd);
                    self.ctx.faces.send(FaceEvent::Look);
                    self.rearm();
                }
                true
            }
            Phase::Capturing => {
                if self.capped() {
                    return true;
                }
                if result.is_speech() {
                    return true;
                }
                match self.confirm_silence() {
                    Some(true) => {
                        if self.capped() {
                            return true;
                        }
                        tracing::info!("speech ended");
                        self.events.emit(PipelineEvent::VadEnd);
                        self.ctx.faces.send(FaceEvent::Think);
                        self.rearm();
                        true
                    }
                    Some(false) => true,
                    None => false,
                }
            }
        }
    }

    fn announce(&mut self) {
        self.events.emit(PipelineEvent::WakenetStart);
        self.ctx.faces.send(FaceEvent::Ask);
        self.announced = true;
    }

    /// Rearm if the feed worker already ended this utterance at the cap
    fn capped(&mut self) -> bool {
        if self.ctx.capture.overflows() == self.overflows_at_start {
            return false;
        }
        tracing::debug!("capture full, rearming wakeword");
        self.ctx.faces.send(FaceEvent::Think);
        self.rearm();
        true
    }

    fn rearm(&mut self) {
        self.engine.enable_wakeword();
        self.phase = Phase::Idle;
    }

    /// Re-check silence over the configured window
    ///
    /// Each poll consumes one queued detection cycle, so the window counts
    /// cycles of audio, not `silence_polls * silence_poll` of wall time.
    ///
    /// `Some(true)` if silence held, `Some(false)` if speech resumed, `None`
    /// if the engine closed meanwhile.
    fn confirm_silence(&self) -> Option<bool> {
        for _ in 0..self.silence_polls {
            std::thread::sleep(self.silence_poll);
            match self.engine.fetch() {
                Ok(Some(r)) if r.is_speech() => return Some(false),
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(e) => tracing::warn!(error = %e, "detection fetch failed during silence check"),
            }
        }

        match self.engine.fetch() {
            Ok(Some(r)) => Some(!r.is_speech()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "final silence check failed, ending capture");
                Some(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::Result;
    use crate::face::FaceEvents;
    use crate::pipeline::capture::CaptureBuffer;
    use crate::pipeline::channels::event_channel;
    use crate::pipeline::context::PipelineMode;
    use crate::voice::VadState;

    type Hook = Box<dyn FnMut() + Send>;

    /// Engine replaying a fixed script; `None` once it runs out
    #[derive(Default)]
    struct Script {
        results: Mutex<VecDeque<DetectionResult>>,
        wakeword: AtomicBool,
        on_fetch: Mutex<Option<Hook>>,
    }

    impl Script {
        fn push(&self, results: &[DetectionResult]) {
            self.results.lock().unwrap().extend(results.iter().copied());
        }
    }

    impl DetectionEngine for Script {
        fn feed(&self, _pcm: &[i16]) {}
        fn fetch(&self) -> Result<Option<DetectionResult>> {
            if let Some(hook) = self.on_fetch.lock().unwrap().as_mut() {
                hook();
            }
            Ok(self.results.lock().unwrap().pop_front())
        }
        fn enable_wakeword(&self) {
            self.wakeword.store(true, Ordering::SeqCst);
        }
        fn disable_wakeword(&self) {
            self.wakeword.store(false, Ordering::SeqCst);
        }
        fn feed_chunksize(&self) -> usize {
            512
        }
        fn fetch_chunksize(&self) -> usize {
            512
        }
    }

    struct Harness {
        detector: Detector,
        engine: Arc<Script>,
        ctx: Arc<PipelineContext>,
        rx: mpsc::Receiver<PipelineEvent>,
    }

    impl Harness {
        fn new(config: &DetectorConfig) -> Self {
            let engine = Arc::new(Script::default());
            engine.enable_wakeword();
            let ctx = Arc::new(PipelineContext::new(
                CaptureBuffer::new(64, 0),
                PipelineMode::Chat,
                FaceEvents::new(),
            ));
            let (events, rx) = event_channel(Arc::clone(&ctx.stats));
            let detector = Detector::new(engine.clone(), Arc::clone(&ctx), events, config);
            Self {
                detector,
                engine,
                ctx,
                rx,
            }
        }

        /// Step and collect whatever was emitted
        fn step(&mut self, result: DetectionResult) -> Vec<PipelineEvent> {
            assert!(self.detector.step(result));
            let mut out = Vec::new();
            while let Ok(ev) = self.rx.try_recv() {
                out.push(ev);
            }
            out
        }

        fn verify(&mut self) {
            assert_eq!(
                self.step(DetectionResult::wake(
                    WakeState::ChannelVerified,
                    VadState::Silence
                )),
                vec![PipelineEvent::WakenetStart]
            );
        }
    }

    fn fast_config() -> DetectorConfig {
        DetectorConfig {
            silence_poll: Duration::from_millis(1),
            silence_polls: 3,
            listen_timeout: Duration::from_secs(60),
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn test_full_turn() {
        let mut h = Harness::new(&fast_config());
        let mut faces = h.ctx.faces.subscribe();

        h.verify();
        assert!(!h.engine.wakeword.load(Ordering::SeqCst));
        assert!(matches!(h.detector.phase(), Phase::WaitingForSpeech { .. }));

        assert_eq!(h.step(DetectionResult::speech()), vec![PipelineEvent::VadStart]);
        assert_eq!(h.detector.phase(), Phase::Capturing);
        assert!(h.step(DetectionResult::speech()).is_empty());

        h.engine.push(&[DetectionResult::silence(); 4]);
        assert_eq!(h.step(DetectionResult::silence()), vec![PipelineEvent::VadEnd]);
        assert_eq!(h.detector.phase(), Phase::Idle);
        assert!(h.engine.wakeword.load(Ordering::SeqCst));

        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Ask);
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Think);
    }

    #[test]
    fn test_detected_then_verified_announces_once() {
        let mut h = Harness::new(&fast_config());

        assert_eq!(
            h.step(DetectionResult::wake(
                WakeState::WakewordDetected,
                VadState::Silence
            )),
            vec![PipelineEvent::WakenetStart]
        );
        assert!(
            h.step(DetectionResult::wake(
                WakeState::ChannelVerified,
                VadState::Silence
            ))
            .is_empty()
        );
        assert!(matches!(h.detector.phase(), Phase::WaitingForSpeech { .. }));
    }

    #[test]
    fn test_speech_resumes_during_recheck() {
        let mut h = Harness::new(&fast_config());
        h.verify();
        h.step(DetectionResult::speech());

        h.engine.push(&[DetectionResult::silence(), DetectionResult::speech()]);
        assert!(h.step(DetectionResult::silence()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Capturing);
    }

    #[test]
    fn test_final_fetch_speech_keeps_capturing() {
        let mut h = Harness::new(&fast_config());
        h.verify();
        h.step(DetectionResult::speech());

        h.engine.push(&[
            DetectionResult::silence(),
            DetectionResult::silence(),
            DetectionResult::silence(),
            DetectionResult::speech(),
        ]);
        assert!(h.step(DetectionResult::silence()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Capturing);
    }

    #[test]
    fn test_listen_timeout_rearms() {
        let config = DetectorConfig {
            listen_timeout: Duration::ZERO,
            ..fast_config()
        };
        let mut h = Harness::new(&config);
        let mut faces = h.ctx.faces.subscribe();

        h.verify();
        assert_eq!(h.step(DetectionResult::silence()), vec![PipelineEvent::WakenetEnd]);
        assert_eq!(h.detector.phase(), Phase::Idle);
        assert!(h.engine.wakeword.load(Ordering::SeqCst));

        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Ask);
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Look);
    }

    #[test]
    fn test_full_buffer_rearms_without_second_end() {
        let mut h = Harness::new(&fast_config());
        h.verify();
        h.step(DetectionResult::speech());

        h.ctx.capture.start();
        h.ctx.capture.append(&[0; 64]);
        h.ctx.capture.mark_overflow_signalled();

        assert!(h.step(DetectionResult::speech()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Idle);
        assert!(h.engine.wakeword.load(Ordering::SeqCst));
    }

    #[test]
    fn test_full_buffer_after_recorder_finished() {
        let mut h = Harness::new(&fast_config());
        let mut faces = h.ctx.faces.subscribe();
        h.verify();
        h.step(DetectionResult::speech());

        // Recorder consumed the synthetic end before the detector's next cycle
        h.ctx.capture.start();
        h.ctx.capture.append(&[0; 64]);
        h.ctx.capture.mark_overflow_signalled();
        let _ = h.ctx.capture.finish();

        assert!(h.step(DetectionResult::speech()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Idle);
        assert!(h.engine.wakeword.load(Ordering::SeqCst));

        // Later silence belongs to no utterance
        assert!(h.step(DetectionResult::silence()).is_empty());
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Ask);
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Think);
        assert!(faces.try_recv().is_err());
    }

    #[test]
    fn test_full_buffer_during_silence_recheck() {
        let mut h = Harness::new(&fast_config());
        let mut faces = h.ctx.faces.subscribe();
        h.verify();
        h.step(DetectionResult::speech());
        h.ctx.capture.start();

        let ctx = Arc::clone(&h.ctx);
        *h.engine.on_fetch.lock().unwrap() = Some(Box::new(move || {
            ctx.capture.append(&[0; 16]);
        }));
        h.engine.push(&[DetectionResult::silence(); 4]);

        assert!(h.step(DetectionResult::silence()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Idle);
        assert_eq!(h.ctx.capture.overflows(), 1);

        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Ask);
        assert_eq!(faces.try_recv().unwrap(), FaceEvent::Think);
        assert!(faces.try_recv().is_err());
    }

    #[test]
    fn test_earlier_overflow_does_not_end_next_utterance() {
        let mut h = Harness::new(&fast_config());
        h.ctx.capture.start();
        h.ctx.capture.append(&[0; 64]);
        let _ = h.ctx.capture.finish();

        h.verify();
        h.step(DetectionResult::speech());
        assert!(h.step(DetectionResult::speech()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Capturing);
    }

    #[test]
    fn test_idle_ignores_vad() {
        let mut h = Harness::new(&fast_config());
        assert!(h.step(DetectionResult::speech()).is_empty());
        assert!(h.step(DetectionResult::silence()).is_empty());
        assert_eq!(h.detector.phase(), Phase::Idle);
    }

    #[test]
    fn test_engine_close_during_recheck_stops() {
        let mut h = Harness::new(&fast_config());
        h.verify();
        h.step(DetectionResult::speech());

        // Script empty: the first recheck fetch reports closed
        assert!(!h.detector.step(DetectionResult::silence()));
    }

    #[test]
    fn test_run_exits_when_engine_closes() {
        let h = Harness::new(&fast_config());
        h.engine.push(&[
            DetectionResult::wake(WakeState::ChannelVerified, VadState::Silence),
            DetectionResult::speech(),
        ]);
        let mut rx = h.rx;
        h.detector.run();

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::WakenetStart);
    }
}
