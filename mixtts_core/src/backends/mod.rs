//! Synthesis backend port and its adapters.
//!
//! Every backend turns `(text, language)` into an [`AudioClip`]. Backends are
//! interchangeable; the [`SynthesisCascade`](crate::cascade::SynthesisCascade)
//! decides the order in which they are tried.

mod azure;
mod google;
mod gtts;
mod piper;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::audio::{AudioClip, AudioError};
use crate::Language;

pub use azure::AzureBackend;
pub use google::GoogleBackend;
pub use gtts::GttsBackend;
pub use piper::PiperBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

impl BackendError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Request(_) | BackendError::Timeout(_) => true,
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Port implemented by every synthesis engine.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Stable engine name, e.g. `"azure"`.
    fn name(&self) -> &str;

    /// Synthesize `text` in `language` once (plus any retries the adapter
    /// performs internally).
    async fn try_synthesize(
        &self,
        text: &str,
        language: Language,
        voice: &VoiceConfig,
    ) -> Result<AudioClip, BackendError>;
}

/// Built-in engines, in their default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Azure,
    Google,
    Piper,
    Gtts,
}

impl Engine {
    pub const PRIORITY: [Engine; 4] = [Engine::Azure, Engine::Google, Engine::Piper, Engine::Gtts];

    pub fn name(self) -> &'static str {
        match self {
            Engine::Azure => "azure",
            Engine::Google => "google",
            Engine::Piper => "piper",
            Engine::Gtts => "gtts",
        }
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Engine::PRIORITY
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown engine '{s}'"))
    }
}

/// Voice settings for one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageVoice {
    /// BCP-47 locale, e.g. `ta-IN`.
    pub locale: String,
    pub azure_voice: String,
    pub google_voice: String,
    /// Speaking-rate offset in percent (`-10` is 10% slower).
    pub rate_percent: i32,
}

/// Per-language voice identifiers and speaking rates shared by all backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub tamil: LanguageVoice,
    pub english: LanguageVoice,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tamil: LanguageVoice {
                locale: "ta-IN".into(),
                azure_voice: "ta-IN-PallaviNeural".into(),
                google_voice: "ta-IN-Standard-A".into(),
                rate_percent: -10,
            },
            english: LanguageVoice {
                locale: "en-IN".into(),
                azure_voice: "en-IN-NeerjaNeural".into(),
                google_voice: "en-IN-Wavenet-D".into(),
                rate_percent: -5,
            },
        }
    }
}

impl VoiceConfig {
    pub fn for_language(&self, language: Language) -> &LanguageVoice {
        match language {
            Language::Tamil => &self.tamil,
            Language::English => &self.english,
        }
    }
}

pub(crate) const RETRY_ATTEMPTS: u32 = 3;
pub(crate) const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run `op` up to `attempts` times, sleeping `delay` between attempts.
/// Only transient errors are retried.
pub(crate) async fn with_retry<T, F, Fut>(
    backend: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("{backend} attempt {attempt}/{attempts} failed: {e}");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Escape XML special characters for SSML.
pub(crate) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format a rate offset the way SSML prosody expects it (`+5%`, `-10%`).
pub(crate) fn signed_percent(rate: i32) -> String {
    if rate >= 0 {
        format!("+{rate}%")
    } else {
        format!("{rate}%")
    }
}
