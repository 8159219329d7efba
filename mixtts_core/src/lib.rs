//! Mixed Tamil/English narration pipeline.
//!
//! Text is split into language-homogeneous [`Segment`]s, each segment is
//! synthesized through a [`SynthesisCascade`] of interchangeable backends, and
//! the resulting clips are stitched back together by the [`AudioAssembler`].
//! The [`JobOrchestrator`] runs the whole pipeline as a background job with
//! observable progress.

pub mod assembler;
pub mod audio;
pub mod backends;
pub mod cascade;
pub mod classifier;
pub mod config;
pub mod extract;
pub mod jobs;
pub mod orchestrator;
pub mod segmenter;

mod mp3;
mod resample;
mod tempo;
mod wav;

use serde::{Deserialize, Serialize};

pub use assembler::{AssembleError, AssemblerConfig, AudioAssembler, LabeledClip};
pub use audio::{AudioClip, AudioError};
pub use backends::{BackendError, Engine, LanguageVoice, SynthesisBackend, VoiceConfig};
pub use cascade::{BackendStats, CascadeError, EnginePreference, SynthesisCascade, Synthesized};
pub use classifier::{LanguageDetector, LinguaDetector, WordClassifier, WordLabel};
pub use config::PipelineConfig;
pub use extract::{extract_text, ExtractError, FileKind};
pub use jobs::{JobArtifact, JobCounts, JobError, JobId, JobRegistry, JobSnapshot, JobStatus};
pub use orchestrator::{JobOrchestrator, OrchestratorSettings, SyncOutput};
pub use segmenter::segment_text;
pub use wav::{decode_wav, encode_wav, wav_base64};

/// The two languages a document may interleave.
///
/// Tamil is the primary language, English the secondary one. Every word ends
/// up in exactly one of these after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Tamil,
    English,
}

impl Language {
    /// ISO 639-1 code, used as the key for per-language voice settings.
    pub fn code(self) -> &'static str {
        match self {
            Language::Tamil => "ta",
            Language::English => "en",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A maximal run of words sharing one language, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub language: Language,
    pub order: usize,
}
