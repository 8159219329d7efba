//! In-memory mono PCM audio.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("WAV decode failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("MP3 decode failed: {0}")]
    Mp3(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Unsupported audio layout: {0}")]
    Unsupported(String),
}

/// Mono f32 samples in [-1.0, 1.0] at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// A silent clip of the given length.
    pub fn silence(duration_ms: u32, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; samples_for_ms(duration_ms, sample_rate)],
            sample_rate,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append `other`, which must already share this clip's sample rate.
    pub fn extend(&mut self, other: &AudioClip) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        self.samples.extend_from_slice(&other.samples);
    }
}

pub(crate) fn samples_for_ms(duration_ms: u32, sample_rate: u32) -> usize {
    (duration_ms as u64 * sample_rate as u64 / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_length() {
        let clip = AudioClip::silence(250, 24_000);
        assert_eq!(clip.samples.len(), 6_000);
        assert!(clip.samples.iter().all(|s| *s == 0.0));
        assert_eq!(clip.duration_ms(), 250);
    }

    #[test]
    fn test_zero_rate_has_no_duration() {
        let clip = AudioClip::new(vec![0.1; 10], 0);
        assert_eq!(clip.duration_ms(), 0);
    }
}
