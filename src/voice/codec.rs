//! Codec interface and PCM helpers
//!
//! Microphone and speaker are exchanged as 16-bit little-endian mono PCM at a
//! sample rate fixed at startup.

use std::io::Cursor;
use std::time::Duration;

use crate::{Error, Result};

/// Bytes per 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Blocking PCM source (microphone codec)
pub trait AudioSource: Send {
    /// Read up to `frame.len()` samples, blocking until some are available
    ///
    /// Returns the number of samples written into `frame`; `Ok(0)` means the
    /// source is closed and will never produce more audio.
    ///
    /// # Errors
    ///
    /// Returns error if the codec read fails
    fn read(&mut self, frame: &mut [i16]) -> Result<usize>;
}

/// Blocking PCM sink (speaker codec)
pub trait AudioSink: Send {
    /// Write PCM16LE bytes, blocking until the codec has accepted them
    ///
    /// # Errors
    ///
    /// Returns error if the codec write fails
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;
}

/// Byte length of `duration` of 16-bit mono PCM at `sample_rate`
#[must_use]
pub fn bytes_for_ms(sample_rate: u32, duration: Duration) -> usize {
    let samples = u128::from(sample_rate) * duration.as_millis() / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX / BYTES_PER_SAMPLE) * BYTES_PER_SAMPLE
}

/// Duration of `len` bytes of 16-bit mono PCM at `sample_rate`
#[must_use]
pub fn pcm_duration(sample_rate: u32, len: usize) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let samples = (len / BYTES_PER_SAMPLE) as u64;
    Duration::from_millis(samples * 1000 / u64::from(sample_rate))
}

/// Serialize samples to PCM16LE bytes
#[must_use]
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Deserialize PCM16LE bytes to samples (a trailing odd byte is ignored)
#[must_use]
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert f32 [-1.0, 1.0] to i16 with clamping
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert i16 to f32 [-1.0, 1.0)
#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Wrap PCM16 samples in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Read a 16-bit PCM WAV file into PCM16LE bytes, downmixing to mono
///
/// # Errors
///
/// Returns error if the WAV is malformed, not 16-bit integer PCM, or its
/// sample rate differs from `sample_rate`
pub fn read_wav_pcm(wav: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(Error::Audio(format!(
            "unsupported clip format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    if spec.sample_rate != sample_rate {
        return Err(Error::Audio(format!(
            "clip sample rate {} does not match codec rate {sample_rate}",
            spec.sample_rate
        )));
    }

    let channels = usize::from(spec.channels.max(1));
    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mono: Vec<i16> = if channels == 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let avg = (sum / frame.len() as i32) as i16;
                avg
            })
            .collect()
    };

    Ok(pcm_to_bytes(&mono))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(bytes_for_ms(16_000, Duration::from_millis(500)), 16_000);
        assert_eq!(bytes_for_ms(16_000, Duration::from_secs(8)), 256_000);
        assert_eq!(pcm_duration(16_000, 32_000), Duration::from_secs(1));
        assert_eq!(pcm_duration(0, 32_000), Duration::ZERO);
    }

    #[test]
    fn test_pcm_bytes() {
        let samples = [0i16, 1, -1, i16::MAX, i16::MIN];
        let bytes = pcm_to_bytes(&samples);
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[2..4], &[1, 0]);
        assert_eq!(bytes_to_pcm(&bytes), samples);

        // Odd trailing byte is dropped
        assert_eq!(bytes_to_pcm(&[1, 0, 7]), vec![1]);
    }

    #[test]
    fn test_sample_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), i16::MIN);
        assert_eq!(f32_to_i16(0.0), 0);
        assert!((i16_to_f32(i16::MIN) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_wav_header() {
        let wav = samples_to_wav(&[0, 100, -100], 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 6);
    }

    #[test]
    fn test_read_wav_rejects_rate_mismatch() {
        let wav = samples_to_wav(&[0, 1, 2], 8_000).unwrap();
        assert!(matches!(read_wav_pcm(&wav, 16_000), Err(Error::Audio(_))));
    }

    #[test]
    fn test_read_wav_stereo_downmix() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [100i16, 300, -50, -150] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let pcm = read_wav_pcm(&cursor.into_inner(), 16_000).unwrap();
        assert_eq!(bytes_to_pcm(&pcm), vec![200, -100]);
    }
}
