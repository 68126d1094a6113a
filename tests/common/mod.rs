//! Shared test utilities
//!
//! Hardware-free stand-ins for the microphone, speaker, detection engine, and
//! remote services, plus a local HTTP server for client tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sparkbot_voice::config::Config;
use sparkbot_voice::voice::{
    AudioSink, AudioSource, ChatModel, Clips, DetectionEngine, DetectionResult, SpeechStream,
    SpeechToText, TextToSpeech, VadState, WakeState,
};
use sparkbot_voice::{Error, Result};

/// Frame pacing for the scripted microphone
pub const PACE: Duration = Duration::from_millis(5);

/// Bytes per engine chunk (512 samples)
pub const CHUNK_BYTES: usize = 1024;

/// Config tuned for fast tests
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.detector.silence_poll = Duration::from_millis(1);
    config.detector.silence_polls = 3;
    config.detector.listen_timeout = Duration::from_secs(10);
    config.pipeline.look_delay = Duration::from_millis(1);
    config.pipeline.playback_timeout = Duration::from_secs(1);
    config
}

/// Distinguishable acknowledgement clips
#[must_use]
pub fn test_clips() -> Clips {
    Clips {
        wake: vec![0xAA; 8],
        chime: vec![0xCC; 8],
    }
}

// ---------------------------------------------------------------------------
// Detection engine
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EngineState {
    script: VecDeque<DetectionResult>,
    pending: VecDeque<DetectionResult>,
    fed: usize,
    fed_samples: usize,
    wakeword: bool,
    closed: bool,
}

/// Engine yielding one scripted result per fed chunk, silence once the
/// script runs out
#[derive(Default)]
pub struct ScriptedEngine {
    state: Mutex<EngineState>,
    ready: Condvar,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new(script: Vec<DetectionResult>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                script: script.into(),
                wakeword: true,
                ..EngineState::default()
            }),
            ready: Condvar::new(),
        })
    }

    pub fn wakeword_enabled(&self) -> bool {
        self.state.lock().unwrap().wakeword
    }

    pub fn fed(&self) -> usize {
        self.state.lock().unwrap().fed
    }

    pub fn fed_samples(&self) -> usize {
        self.state.lock().unwrap().fed_samples
    }
}

impl DetectionEngine for ScriptedEngine {
    fn feed(&self, pcm: &[i16]) {
        let mut state = self.state.lock().unwrap();
        let next = state.script.pop_front().unwrap_or_else(DetectionResult::silence);
        state.pending.push_back(next);
        state.fed += 1;
        state.fed_samples += pcm.len();
        drop(state);
        self.ready.notify_one();
    }

    fn fetch(&self) -> Result<Option<DetectionResult>> {
        let mut state = self
            .ready
            .wait_while(self.state.lock().unwrap(), |s| {
                s.pending.is_empty() && !s.closed
            })
            .unwrap();
        Ok(state.pending.pop_front())
    }

    fn enable_wakeword(&self) {
        self.state.lock().unwrap().wakeword = true;
    }

    fn disable_wakeword(&self) {
        self.state.lock().unwrap().wakeword = false;
    }

    fn feed_chunksize(&self) -> usize {
        512
    }

    fn fetch_chunksize(&self) -> usize {
        512
    }

    fn feed_channels(&self) -> usize {
        2
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.ready.notify_all();
    }
}

/// Wakeword verified, `lead` silent chunks, `speech` speech chunks, `tail`
/// silent chunks
#[must_use]
pub fn turn(lead: usize, speech: usize, tail: usize) -> Vec<DetectionResult> {
    let mut script = vec![DetectionResult::wake(
        WakeState::ChannelVerified,
        VadState::Silence,
    )];
    script.extend(std::iter::repeat_n(DetectionResult::silence(), lead));
    script.extend(std::iter::repeat_n(DetectionResult::speech(), speech));
    script.extend(std::iter::repeat_n(DetectionResult::silence(), tail));
    script
}

// ---------------------------------------------------------------------------
// Audio devices
// ---------------------------------------------------------------------------

/// Microphone producing `frames` constant frames, one per `PACE`
pub struct PacedMic {
    remaining: usize,
    amplitude: i16,
}

impl PacedMic {
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self {
            remaining: frames,
            amplitude: 1000,
        }
    }
}

impl AudioSource for PacedMic {
    fn read(&mut self, frame: &mut [i16]) -> Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        std::thread::sleep(PACE);
        self.remaining -= 1;
        frame.fill(self.amplitude);
        Ok(frame.len())
    }
}

/// Speaker recording every write
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    delay: Duration,
}

impl RecordingSpeaker {
    /// Speaker taking `delay` per write
    #[must_use]
    pub fn slow(delay: Duration) -> Self {
        Self {
            writes: Arc::default(),
            delay,
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

impl AudioSink for RecordingSpeaker {
    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.writes.lock().unwrap().push(pcm.to_vec());
        Ok(pcm.len())
    }
}

// ---------------------------------------------------------------------------
// Remote services
// ---------------------------------------------------------------------------

/// STT returning a fixed transcript, or failing when none is set
#[derive(Clone, Default)]
pub struct FakeStt {
    pub calls: Arc<Mutex<Vec<usize>>>,
    transcript: Option<String>,
}

impl FakeStt {
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self {
            calls: Arc::default(),
            transcript: Some(text.to_string()),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    /// Utterance lengths received so far
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, pcm: &[u8]) -> Result<String> {
        self.calls.lock().unwrap().push(pcm.len());
        self.transcript
            .clone()
            .ok_or_else(|| Error::Stt("STT API error 502 Bad Gateway".to_string()))
    }
}

/// Chat returning a fixed reply, or failing when none is set
#[derive(Clone, Default)]
pub struct FakeChat {
    pub calls: Arc<Mutex<Vec<String>>>,
    reply: Option<String>,
}

impl FakeChat {
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self {
            calls: Arc::default(),
            reply: Some(text.to_string()),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, text: &str) -> Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        self.reply
            .clone()
            .ok_or_else(|| Error::Chat("chat API error 500 Internal Server Error".to_string()))
    }
}

/// TTS answering every reply with `chunks` four-byte chunks tagged 1, 2, 3...
#[derive(Clone)]
pub struct FakeTts {
    pub requests: Arc<Mutex<Vec<String>>>,
    pub pulled: Arc<AtomicUsize>,
    chunks: usize,
}

impl FakeTts {
    #[must_use]
    pub fn new(chunks: usize) -> Self {
        Self {
            requests: Arc::default(),
            pulled: Arc::default(),
            chunks,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

/// Expected chunk `i` (zero-based) of a `FakeTts` reply
#[must_use]
pub fn tts_chunk(i: usize) -> Vec<u8> {
    vec![u8::try_from(i + 1).unwrap(); 4]
}

struct FakeSpeech {
    next: usize,
    total: usize,
    pulled: Arc<AtomicUsize>,
}

#[async_trait]
impl SpeechStream for FakeSpeech {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let chunk = tts_chunk(self.next);
        self.next += 1;
        self.pulled.fetch_add(1, Ordering::SeqCst);
        Ok(Some(chunk))
    }

    fn close(&mut self) {
        self.total = self.next;
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn SpeechStream>> {
        self.requests.lock().unwrap().push(text.to_string());
        Ok(Box::new(FakeSpeech {
            next: 0,
            total: self.chunks,
            pulled: Arc::clone(&self.pulled),
        }))
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{addr}")
}
