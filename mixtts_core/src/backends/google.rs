//! Google Cloud Text-to-Speech (`text:synthesize`) with an API key.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{with_retry, BackendError, SynthesisBackend, VoiceConfig};
use super::{RETRY_ATTEMPTS, RETRY_DELAY};
use crate::audio::AudioClip;
use crate::wav::decode_wav;
use crate::Language;

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";
const SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: Input<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[derive(Debug, Clone)]
pub struct GoogleBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleBackend {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/text:synthesize", self.base_url.trim_end_matches('/'))
    }

    /// `-10` percent maps to a speaking rate of `0.9`.
    fn speaking_rate(rate_percent: i32) -> f32 {
        (1.0 + rate_percent as f32 / 100.0).clamp(0.25, 4.0)
    }

    async fn request(&self, body: &SynthesizeRequest<'_>) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        general_purpose::STANDARD
            .decode(parsed.audio_content)
            .map_err(|e| BackendError::InvalidResponse(format!("audioContent is not base64: {e}")))
    }
}

#[async_trait]
impl SynthesisBackend for GoogleBackend {
    fn name(&self) -> &str {
        "google"
    }

    #[instrument(skip(self, voice), fields(chars = text.chars().count()))]
    async fn try_synthesize(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::NotConfigured("GOOGLE_TTS_API_KEY is empty".into()));
        }
        let v = voice.for_language(language);
        let body = SynthesizeRequest {
            input: Input { text },
            voice: VoiceSelection {
                language_code: &v.locale,
                name: &v.google_voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
                speaking_rate: Self::speaking_rate(v.rate_percent),
                pitch: 0.0,
                sample_rate_hertz: SAMPLE_RATE,
            },
        };

        let bytes = with_retry(self.name(), RETRY_ATTEMPTS, RETRY_DELAY, || self.request(&body)).await?;
        debug!("google returned {} bytes", bytes.len());
        Ok(decode_wav(&bytes)?)
    }
}
