//! Voice processing module
//!
//! Host audio devices, the detection engine, acknowledgement clips, and the
//! remote STT, chat, and TTS clients the pipeline drives.

mod capture;
mod chat;
mod clips;
mod codec;
mod engine;
mod playback;
mod stt;
mod tts;
mod wake_word;

pub use capture::{METER_INTERVAL, Microphone, MicrophoneCloser, levels};
pub use chat::{ChatModel, HttpChat, parse_chat_response};
pub use clips::{Clips, tone};
pub use codec::{
    AudioSink, AudioSource, BYTES_PER_SAMPLE, bytes_for_ms, bytes_to_pcm, f32_to_i16,
    i16_to_f32, pcm_duration, pcm_to_bytes, read_wav_pcm, samples_to_wav,
};
pub use engine::{DetectionEngine, DetectionResult, VadState, WakeState};
pub use playback::Speaker;
pub use stt::{HttpSpeechToText, SpeechToText, parse_asr_response};
pub use tts::{ChunkedSpeech, HttpTextToSpeech, SpeechStream, TextToSpeech};
pub use wake_word::{CHUNK_SAMPLES, DetectorState, EnergyEngine};
