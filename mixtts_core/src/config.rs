//! Pipeline configuration read from the environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::assembler::{AssemblerConfig, AudioAssembler};
use crate::backends::{AzureBackend, Engine, GoogleBackend, GttsBackend, PiperBackend, SynthesisBackend, VoiceConfig};
use crate::cascade::{EnginePreference, SynthesisCascade};
use crate::classifier::{LanguageDetector, DEFAULT_SHORT_WORD_THRESHOLD};
use crate::orchestrator::{JobOrchestrator, OrchestratorSettings};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub engine: EnginePreference,
    pub voice: VoiceConfig,
    pub assembler: AssemblerConfig,
    pub orchestrator: OrchestratorSettings,
    pub backend_timeout: Duration,
    /// Terminal jobs older than this are evicted by the background sweep.
    pub job_ttl: Duration,
    pub azure_key: Option<String>,
    pub azure_region: String,
    pub google_api_key: Option<String>,
    pub piper_voice_map: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EnginePreference::Auto,
            voice: VoiceConfig::default(),
            assembler: AssemblerConfig::default(),
            orchestrator: OrchestratorSettings::default(),
            backend_timeout: Duration::from_secs(30),
            job_ttl: Duration::from_secs(3600),
            azure_key: None,
            azure_region: "centralindia".to_string(),
            google_api_key: None,
            piper_voice_map: PathBuf::from("models/map.json"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Accepted range for `MIXTTS_TEMPO`.
pub const TEMPO_RANGE: std::ops::RangeInclusive<f32> = 0.5..=4.0;

fn clamp_tempo(tempo: f32, default: f32) -> f32 {
    if !tempo.is_finite() {
        warn!("Ignoring MIXTTS_TEMPO={tempo}; using {default}");
        return default;
    }
    let clamped = tempo.clamp(*TEMPO_RANGE.start(), *TEMPO_RANGE.end());
    if clamped != tempo {
        warn!("MIXTTS_TEMPO={tempo} is out of range, using {clamped}");
    }
    clamped
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let engine = match std::env::var("TTS_ENGINE") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                warn!("Ignoring TTS_ENGINE: {e}; using auto");
                EnginePreference::Auto
            }),
            Err(_) => EnginePreference::Auto,
        };

        let mut voice = defaults.voice;
        voice.tamil.rate_percent = env_parse("MIXTTS_RATE_TA", voice.tamil.rate_percent);
        voice.english.rate_percent = env_parse("MIXTTS_RATE_EN", voice.english.rate_percent);
        if let Some(v) = env_string("AZURE_VOICE_TA") {
            voice.tamil.azure_voice = v;
        }
        if let Some(v) = env_string("AZURE_VOICE_EN") {
            voice.english.azure_voice = v;
        }
        if let Some(v) = env_string("GOOGLE_VOICE_TA") {
            voice.tamil.google_voice = v;
        }
        if let Some(v) = env_string("GOOGLE_VOICE_EN") {
            voice.english.google_voice = v;
        }

        let assembler = AssemblerConfig {
            boundary_gap_ms: env_parse("MIXTTS_BOUNDARY_GAP_MS", defaults.assembler.boundary_gap_ms),
            tempo: clamp_tempo(
                env_parse("MIXTTS_TEMPO", defaults.assembler.tempo),
                defaults.assembler.tempo,
            ),
            output_sample_rate: env_parse("MIXTTS_OUTPUT_SAMPLE_RATE", defaults.assembler.output_sample_rate),
        };

        let orchestrator = OrchestratorSettings {
            placeholder_ms: env_parse("MIXTTS_PLACEHOLDER_MS", defaults.orchestrator.placeholder_ms),
            max_concurrent_synthesis: env_parse(
                "MIXTTS_MAX_CONCURRENT_SYNTHESIS",
                defaults.orchestrator.max_concurrent_synthesis,
            )
            .max(1),
            short_word_threshold: env_parse("MIXTTS_SHORT_WORD_THRESHOLD", DEFAULT_SHORT_WORD_THRESHOLD),
        };

        Self {
            engine,
            voice,
            assembler,
            orchestrator,
            backend_timeout: Duration::from_secs(env_parse("MIXTTS_BACKEND_TIMEOUT_SECS", 30)),
            job_ttl: Duration::from_secs(env_parse("MIXTTS_JOB_TTL_SECS", 3600)),
            azure_key: env_string("AZURE_SPEECH_KEY"),
            azure_region: env_string("AZURE_SPEECH_REGION").unwrap_or(defaults.azure_region),
            google_api_key: env_string("GOOGLE_TTS_API_KEY"),
            piper_voice_map: env_string("PIPER_VOICE_MAP")
                .map(PathBuf::from)
                .unwrap_or(defaults.piper_voice_map),
        }
    }

    /// Instantiate every backend whose credentials or models are present.
    pub fn available_backends(&self) -> anyhow::Result<Vec<(Engine, Arc<dyn SynthesisBackend>)>> {
        let client = reqwest::Client::builder()
            .timeout(self.backend_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut backends: Vec<(Engine, Arc<dyn SynthesisBackend>)> = Vec::new();

        if let Some(key) = &self.azure_key {
            backends.push((Engine::Azure, Arc::new(AzureBackend::new(client.clone(), key, &self.azure_region))));
        }
        if let Some(key) = &self.google_api_key {
            backends.push((Engine::Google, Arc::new(GoogleBackend::new(client.clone(), key))));
        }
        match PiperBackend::from_mapfile(&self.piper_voice_map) {
            Ok(piper) => {
                info!("Piper voices loaded for {:?}", piper.languages());
                backends.push((Engine::Piper, Arc::new(piper)));
            }
            Err(e) => warn!("Piper disabled: {e:#}"),
        }
        backends.push((Engine::Gtts, Arc::new(GttsBackend::new(client))));

        Ok(backends)
    }

    pub fn build_cascade(&self) -> anyhow::Result<SynthesisCascade> {
        let cascade = SynthesisCascade::from_available(
            self.available_backends()?,
            self.engine,
            self.voice.clone(),
            self.backend_timeout,
        );
        info!("Synthesis cascade: {:?}", cascade.backend_names());
        Ok(cascade)
    }

    pub fn build_orchestrator(&self, detector: Arc<dyn LanguageDetector>) -> anyhow::Result<JobOrchestrator> {
        Ok(JobOrchestrator::new(
            self.build_cascade()?,
            AudioAssembler::new(self.assembler.clone()),
            detector,
            self.orchestrator.clone(),
        ))
    }
}
