//! Azure Cognitive Services neural TTS over the REST endpoint.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{signed_percent, with_retry, xml_escape, BackendError, SynthesisBackend, VoiceConfig};
use super::{RETRY_ATTEMPTS, RETRY_DELAY};
use crate::audio::AudioClip;
use crate::wav::decode_wav;
use crate::Language;

const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

#[derive(Debug, Clone)]
pub struct AzureBackend {
    client: Client,
    key: String,
    endpoint: String,
}

impl AzureBackend {
    pub fn new(client: Client, key: impl Into<String>, region: &str) -> Self {
        let endpoint = format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1");
        Self::with_endpoint(client, key, endpoint)
    }

    /// Point the backend at an explicit synthesis URL.
    pub fn with_endpoint(client: Client, key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn build_ssml(text: &str, language: Language, voice: &VoiceConfig) -> String {
        let v = voice.for_language(language);
        format!(
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'>\
             <voice name='{}'><prosody rate='{}' pitch='+0%'>{}</prosody></voice></speak>",
            v.locale,
            v.azure_voice,
            signed_percent(v.rate_percent),
            xml_escape(text)
        )
    }

    async fn request(&self, ssml: String) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header("User-Agent", "mixtts")
            .body(ssml)
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
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SynthesisBackend for AzureBackend {
    fn name(&self) -> &str {
        "azure"
    }

    #[instrument(skip(self, voice), fields(chars = text.chars().count()))]
    async fn try_synthesize(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, BackendError> {
        if self.key.is_empty() {
            return Err(BackendError::NotConfigured("AZURE_SPEECH_KEY is empty".into()));
        }
        let ssml = Self::build_ssml(text, language, voice);
        let bytes = with_retry(self.name(), RETRY_ATTEMPTS, RETRY_DELAY, || self.request(ssml.clone())).await?;
        if bytes.is_empty() {
            return Err(BackendError::InvalidResponse("empty audio body".into()));
        }
        debug!("azure returned {} bytes", bytes.len());
        Ok(decode_wav(&bytes)?)
    }
}
