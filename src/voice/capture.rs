//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::voice::codec::{AudioSource, f32_to_i16};
use crate::{Error, Result};

/// Samples buffered before the oldest are discarded (2 s at 16 kHz)
const MAX_BUFFERED_SAMPLES: usize = 32_000;

/// Shared between the cpal callback and the reading worker
#[derive(Default)]
struct Shared {
    samples: Mutex<Buffered>,
    ready: Condvar,
}

#[derive(Default)]
struct Buffered {
    samples: VecDeque<i16>,
    closed: bool,
}

impl Shared {
    fn close(&self) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.closed = true;
        }
        self.ready.notify_all();
    }
}

/// Ends a [`Microphone`]'s stream from another thread
///
/// Readers drain what is buffered, then see end of stream.
#[derive(Clone)]
pub struct MicrophoneCloser {
    shared: Arc<Shared>,
}

impl MicrophoneCloser {
    pub fn close(&self) {
        tracing::debug!("closing microphone");
        self.shared.close();
    }
}

/// Captures audio from the default input device
///
/// The cpal stream is not `Send`, so it lives on a holder thread; this handle
/// only owns the shared sample buffer and the holder's stop channel.
pub struct Microphone {
    shared: Arc<Shared>,
    sample_rate: u32,
    stop: Option<std::sync::mpsc::Sender<()>>,
    holder: Option<std::thread::JoinHandle<()>>,
}

impl Microphone {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the audio device cannot be opened
    pub fn open(sample_rate: u32, gain: f32) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let callback_shared = Arc::clone(&shared);
        let holder = std::thread::Builder::new()
            .name("mic-stream".to_string())
            .spawn(move || {
                let stream = match build_input_stream(sample_rate, gain, &callback_shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park until the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited during startup".to_string()))??;

        tracing::debug!("audio capture started");

        Ok(Self {
            shared,
            sample_rate,
            stop: Some(stop_tx),
            holder: Some(holder),
        })
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Handle for closing the stream while the microphone is owned elsewhere
    #[must_use]
    pub fn closer(&self) -> MicrophoneCloser {
        MicrophoneCloser {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take everything captured so far without blocking
    #[must_use]
    pub fn take_buffer(&self) -> Vec<i16> {
        self.shared
            .samples
            .lock()
            .map(|mut buf| buf.samples.drain(..).collect())
            .unwrap_or_default()
    }
}

impl AudioSource for Microphone {
    fn read(&mut self, frame: &mut [i16]) -> Result<usize> {
        if frame.is_empty() {
            return Ok(0);
        }

        let mut buf = self
            .shared
            .ready
            .wait_while(
                self.shared
                    .samples
                    .lock()
                    .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?,
                |b| b.samples.len() < frame.len() && !b.closed,
            )
            .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?;

        let n = frame.len().min(buf.samples.len());
        for (dst, src) in frame.iter_mut().zip(buf.samples.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.shared.close();

        drop(self.stop.take());
        if let Some(holder) = self.holder.take() {
            let _ = holder.join();
        }
    }
}

fn build_input_stream(sample_rate: u32, gain: f32, shared: &Arc<Shared>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    let shared = Arc::clone(shared);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = shared.samples.lock() {
                    buf.samples
                        .extend(data.iter().map(|&s| f32_to_i16(s * gain)));
                    let excess = buf.samples.len().saturating_sub(MAX_BUFFERED_SAMPLES);
                    if excess > 0 {
                        buf.samples.drain(..excess);
                    }
                }
                shared.ready.notify_one();
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}

/// RMS and peak level of a sample window, for meters
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn levels(samples: &[i16]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }

    let mut sum = 0.0f32;
    let mut peak = 0.0f32;
    for &s in samples {
        let f = crate::voice::codec::i16_to_f32(s);
        sum += f * f;
        peak = peak.max(f.abs());
    }
    ((sum / samples.len() as f32).sqrt(), peak)
}

/// Poll interval used by meters
pub const METER_INTERVAL: Duration = Duration::from_secs(1);
