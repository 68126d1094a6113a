//! Sparkbot Voice - wakeword-driven voice assistant pipeline
//!
//! This library provides the building blocks of a hands-free voice loop:
//! - Wakeword and voice-activity detection over a live microphone
//! - Utterance capture with length limits
//! - Remote speech-to-text, chat completion, and streamed text-to-speech
//! - Ordered playback with acknowledgement clips and barge-in
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Audio threads (real time)               │
//! │   Feed  │  Detector  │  Recorder  │  Playback       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ bounded channels
//! ┌────────────────────▼────────────────────────────────┐
//! │                Network tasks (tokio)                 │
//! │        STT  ──▶  Chat  ──▶  TTS                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod face;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use face::{FaceEvent, FaceEvents};
pub use pipeline::{Devices, Pipeline, PipelineHandle, PipelineMode, Services};
