//! Short acknowledgement clips played straight to the speaker

use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::config::ClipsConfig;
use crate::voice::codec::{f32_to_i16, pcm_to_bytes, read_wav_pcm};

/// Pre-rendered PCM16LE acknowledgement sounds
#[derive(Debug, Clone)]
pub struct Clips {
    /// Played when the wakeword is heard
    pub wake: Vec<u8>,
    /// Played on an external chime request
    pub chime: Vec<u8>,
}

impl Clips {
    /// Load clips from configured WAV files, synthesizing tones for unset ones
    ///
    /// # Errors
    ///
    /// Returns error if a configured clip cannot be read or has the wrong format
    pub fn load(config: &ClipsConfig, sample_rate: u32) -> Result<Self> {
        let wake = match &config.wake {
            Some(path) => load_clip(path, sample_rate)?,
            None => tone(sample_rate, &[(880.0, Duration::from_millis(120))]),
        };
        let chime = match &config.chime {
            Some(path) => load_clip(path, sample_rate)?,
            None => tone(
                sample_rate,
                &[
                    (660.0, Duration::from_millis(90)),
                    (990.0, Duration::from_millis(140)),
                ],
            ),
        };

        Ok(Self { wake, chime })
    }
}

fn load_clip(path: &Path, sample_rate: u32) -> Result<Vec<u8>> {
    let wav = std::fs::read(path)?;
    let pcm = read_wav_pcm(&wav, sample_rate)?;
    tracing::debug!(path = %path.display(), bytes = pcm.len(), "loaded clip");
    Ok(pcm)
}

/// Render a sequence of sine notes with short fades to avoid clicks
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn tone(sample_rate: u32, notes: &[(f32, Duration)]) -> Vec<u8> {
    let rate = sample_rate as f32;
    let fade = (rate * 0.005) as usize;
    let mut samples = Vec::new();

    for &(frequency, duration) in notes {
        let count = (rate * duration.as_secs_f32()) as usize;
        samples.extend((0..count).map(|i| {
            let t = i as f32 / rate;
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if count - i < fade {
                (count - i) as f32 / fade as f32
            } else {
                1.0
            };
            f32_to_i16(0.3 * envelope * (2.0 * std::f32::consts::PI * frequency * t).sin())
        }));
    }

    pcm_to_bytes(&samples)
}
