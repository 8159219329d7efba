//! Joins per-segment clips into the final narration track.

use serde::Serialize;
use thiserror::Error;

use crate::audio::{samples_for_ms, AudioClip, AudioError};
use crate::resample::resample;
use crate::tempo::change_tempo;
use crate::wav::encode_wav;
use crate::Language;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("Nothing to assemble: no audio clips were produced")]
    NothingToAssemble,

    #[error("Audio processing failed: {0}")]
    Audio(#[from] AudioError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblerConfig {
    /// Silence inserted where the language changes between two clips.
    pub boundary_gap_ms: u32,
    /// Playback speed multiplier applied to the whole track.
    pub tempo: f32,
    /// Every clip is converted to this rate before concatenation.
    pub output_sample_rate: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            boundary_gap_ms: 200,
            tempo: 1.25,
            output_sample_rate: 24_000,
        }
    }
}

/// A synthesized clip together with the language of the segment it voices.
#[derive(Debug, Clone)]
pub struct LabeledClip {
    pub audio: AudioClip,
    pub language: Language,
}

#[derive(Debug, Clone, Default)]
pub struct AudioAssembler {
    config: AssemblerConfig,
}

impl AudioAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Concatenate `clips` in the given order.
    ///
    /// A gap of `boundary_gap_ms` goes between two clips only when their
    /// languages differ. The joined track is then re-timed by `tempo`.
    pub fn assemble(&self, clips: &[LabeledClip]) -> Result<AudioClip, AssembleError> {
        if clips.is_empty() {
            return Err(AssembleError::NothingToAssemble);
        }

        let rate = self.config.output_sample_rate;
        let gap = samples_for_ms(self.config.boundary_gap_ms, rate);
        let mut track = AudioClip::new(Vec::new(), rate);
        let mut previous: Option<Language> = None;

        for clip in clips {
            if previous.is_some_and(|lang| lang != clip.language) {
                track.samples.extend(std::iter::repeat(0.0).take(gap));
            }
            track.extend(&resample(&clip.audio, rate)?);
            previous = Some(clip.language);
        }

        track.samples = change_tempo(&track.samples, rate, self.config.tempo);
        Ok(track)
    }

    /// Assemble and encode the result as WAV bytes.
    pub fn assemble_wav(&self, clips: &[LabeledClip]) -> Result<(Vec<u8>, AudioClip), AssembleError> {
        let track = self.assemble(clips)?;
        let bytes = encode_wav(&track)?;
        Ok((bytes, track))
    }
}
