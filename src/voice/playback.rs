//! Audio playback to speakers

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::voice::codec::{AudioSink, bytes_to_pcm, i16_to_f32};
use crate::{Error, Result};

/// Plays PCM to the default output device
pub struct Speaker {
    config: StreamConfig,
    sample_rate: u32,
}

impl Speaker {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            move |c: &cpal::SupportedStreamConfigRange| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            }
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(supports(1))
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(supports(2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            sample_rate,
        })
    }

    /// Play samples to completion
    fn play_samples_blocking(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let sample_count = samples.len();

        let state = Arc::new(Mutex::new(PlayState {
            samples,
            position: 0,
        }));
        let callback_state = Arc::clone(&state);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut state) = callback_state.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = state.samples.get(state.position).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if state.position < state.samples.len() {
                            state.position += 1;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(self.sample_rate);

        // Poll for completion with timeout
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        loop {
            let finished = state
                .lock()
                .map(|s| s.position >= s.samples.len())
                .unwrap_or(true);
            if finished || start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        drop(stream);
        tracing::trace!(samples = sample_count, "playback complete");

        Ok(())
    }
}

struct PlayState {
    samples: Vec<f32>,
    position: usize,
}

impl AudioSink for Speaker {
    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let samples = bytes_to_pcm(pcm).into_iter().map(i16_to_f32).collect();
        self.play_samples_blocking(samples)?;
        Ok(pcm.len())
    }
}
