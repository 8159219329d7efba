//! Local offline synthesis with Piper ONNX voices.
//!
//! Voices come from a JSON map keyed by language (`"ta"`, `"en"`, or a locale
//! such as `"ta_IN"`). Each entry is either the path to a Piper model config
//! or an object `{ "config": "..." }`. Other object keys, such as a
//! multi-speaker model's `default_speaker`, are ignored: piper-rs 0.1.9 has no
//! public speaker selection, so every voice speaks with its model default.

use std::{collections::HashMap, fs, path::Path, sync::{Arc, RwLock}};

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{BackendError, SynthesisBackend, VoiceConfig};
use crate::audio::AudioClip;
use crate::Language;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub config: String,
}

// Loaded synthesizer and its output rate
struct CachedSynth {
    synth: Arc<RwLock<PiperSpeechSynthesizer>>,
    sample_rate: u32,
}

impl std::fmt::Debug for CachedSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSynth")
            .field("synth", &"<PiperSpeechSynthesizer>")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[derive(Debug)]
struct PiperVoices {
    map: HashMap<String, MapEntry>,
    // config path -> synthesizer, so each model is loaded once
    cache: DashMap<String, CachedSynth>,
}

#[derive(Debug, Clone)]
pub struct PiperBackend {
    voices: Arc<PiperVoices>,
}

impl PiperBackend {
    pub fn new(map: HashMap<String, MapEntry>) -> Self {
        Self {
            voices: Arc::new(PiperVoices {
                map,
                cache: DashMap::new(),
            }),
        }
    }

    /// Load the voice map from a JSON file such as `models/map.json`.
    pub fn from_mapfile<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).with_context(|| "voice map is not valid JSON")?;
        Ok(Self::new(parse_voice_map(&json)?))
    }

    /// Language keys with a configured voice.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.voices.map.keys().cloned().collect();
        langs.sort();
        langs
    }

    fn entry_for(&self, language: Language, voice: &VoiceConfig) -> Option<&MapEntry> {
        let locale = voice.for_language(language).locale.replace('-', "_");
        self.voices
            .map
            .get(language.code())
            .or_else(|| self.voices.map.get(&locale))
    }
}

pub(crate) fn parse_voice_map(json: &serde_json::Value) -> anyhow::Result<HashMap<String, MapEntry>> {
    let obj = json
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("voice map must be a JSON object"))?;

    let mut map = HashMap::new();
    for (lang, v) in obj {
        let entry = match v {
            serde_json::Value::String(path) => MapEntry {
                config: path.clone(),
            },
            serde_json::Value::Object(o) => MapEntry {
                config: o
                    .get("config")
                    .and_then(|x| x.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'config' for key {}", lang))?
                    .to_string(),
            },
            _ => {
                return Err(anyhow::anyhow!(
                    "invalid entry for key {} (expected string or object)",
                    lang
                ))
            }
        };
        map.insert(lang.clone(), entry);
    }
    Ok(map)
}

impl PiperVoices {
    fn read_sample_rate<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<u32> {
        let text = fs::read_to_string(cfg_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", cfg_path.as_ref().display()))?;
        let json: serde_json::Value =
            serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

        let sample_rate = json
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(|sr| sr.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;
        Ok(sample_rate as u32)
    }

    fn get_or_create_synth(&self, cfg_path: &str) -> anyhow::Result<(Arc<RwLock<PiperSpeechSynthesizer>>, u32)> {
        if let Some(cached) = self.cache.get(cfg_path) {
            return Ok((cached.synth.clone(), cached.sample_rate));
        }

        let sample_rate = Self::read_sample_rate(cfg_path)?;
        let model = piper_rs::from_config_path(Path::new(cfg_path))
            .map_err(|e| anyhow::anyhow!("piper load error: {e}"))?;
        let synth = Arc::new(RwLock::new(PiperSpeechSynthesizer::new(model)?));

        self.cache.insert(
            cfg_path.to_string(),
            CachedSynth {
                synth: synth.clone(),
                sample_rate,
            },
        );
        Ok((synth, sample_rate))
    }

    /// Blocking: run the model over `text`.
    fn synthesize(&self, cfg_path: &str, text: &str) -> anyhow::Result<AudioClip> {
        let (synth_arc, sample_rate) = self.get_or_create_synth(cfg_path)?;
        let synth = synth_arc
            .read()
            .map_err(|_| anyhow::anyhow!("Synthesizer lock poisoned"))?;

        let iter: PiperSpeechStreamParallel = synth
            .synthesize_parallel(text.to_string(), None)
            .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))?;

        let mut samples: Vec<f32> = Vec::new();
        for part in iter {
            samples.extend(part.map_err(|e| anyhow::anyhow!("chunk error: {e}"))?.into_vec());
        }
        Ok(AudioClip::new(samples, sample_rate))
    }
}

#[async_trait]
impl SynthesisBackend for PiperBackend {
    fn name(&self) -> &str {
        "piper"
    }

    #[instrument(skip(self, voice), fields(chars = text.chars().count()))]
    async fn try_synthesize(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, BackendError> {
        let cfg_path = self
            .entry_for(language, voice)
            .map(|e| e.config.clone())
            .ok_or_else(|| BackendError::NotConfigured(format!("no piper voice for '{}'", language.code())))?;

        let voices = self.voices.clone();
        let text = text.to_string();
        let clip = tokio::task::spawn_blocking(move || voices.synthesize(&cfg_path, &text))
            .await
            .map_err(|e| BackendError::Synthesis(format!("piper task failed: {e}")))?
            .map_err(|e| BackendError::Synthesis(e.to_string()))?;

        if clip.is_empty() {
            return Err(BackendError::Synthesis("piper produced no audio".into()));
        }
        debug!("piper produced {} samples", clip.samples.len());
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_and_object_entries() {
        let map = parse_voice_map(&json!({
            "ta": "models/ta/voice.onnx.json",
            "en_IN": { "config": "models/en/voice.onnx.json", "default_speaker": 2 }
        }))
        .unwrap();

        assert_eq!(map["ta"].config, "models/ta/voice.onnx.json");
        assert_eq!(
            map["en_IN"],
            MapEntry {
                config: "models/en/voice.onnx.json".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(parse_voice_map(&json!(["ta"])).is_err());
        assert!(parse_voice_map(&json!({ "ta": 5 })).is_err());
        assert!(parse_voice_map(&json!({ "ta": { "speaker": 1 } })).is_err());
    }

    #[test]
    fn test_lookup_by_code_then_locale() {
        let backend = PiperBackend::new(
            parse_voice_map(&json!({ "ta": "ta.json", "en_IN": "en.json" })).unwrap(),
        );
        let voice = VoiceConfig::default();
        assert_eq!(backend.entry_for(Language::Tamil, &voice).unwrap().config, "ta.json");
        assert_eq!(backend.entry_for(Language::English, &voice).unwrap().config, "en.json");
        assert_eq!(backend.languages(), vec!["en_IN".to_string(), "ta".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_voice_is_not_configured() {
        let backend = PiperBackend::new(HashMap::new());
        let err = backend
            .try_synthesize("hello", Language::English, &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_missing_model_file_is_a_synthesis_error() {
        let backend = PiperBackend::new(
            parse_voice_map(&json!({ "en": "/nonexistent/voice.onnx.json" })).unwrap(),
        );
        let err = backend
            .try_synthesize("hello", Language::English, &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Synthesis(_)));
    }
}
