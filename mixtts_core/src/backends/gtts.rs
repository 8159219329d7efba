//! Google Translate's public speech endpoint. Needs no credentials, so it is
//! the backend of last resort.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{with_retry, BackendError, SynthesisBackend, VoiceConfig};
use super::{RETRY_ATTEMPTS, RETRY_DELAY};
use crate::audio::AudioClip;
use crate::mp3::decode_mp3;
use crate::resample::resample;
use crate::Language;

const DEFAULT_BASE_URL: &str = "https://translate.google.com";
/// The endpoint rejects longer inputs.
const MAX_CHUNK_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct GttsBackend {
    client: Client,
    base_url: String,
}

impl GttsBackend {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch_chunk(&self, chunk: &str, lang: &str) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}/translate_tts", self.base_url.trim_end_matches('/'));
        let len = chunk.chars().count().to_string();
        let response = self
            .client
            .get(url)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("textlen", len.as_str()),
            ])
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

/// Split `text` into pieces of at most `max_chars` characters, breaking at
/// whitespace where possible.
pub(crate) fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl SynthesisBackend for GttsBackend {
    fn name(&self) -> &str {
        "gtts"
    }

    #[instrument(skip(self, _voice), fields(chars = text.chars().count()))]
    async fn try_synthesize(
        &self,
        text: &str,
        language: Language,
        _voice: &VoiceConfig,
    ) -> Result<AudioClip, BackendError> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(BackendError::Synthesis("nothing to speak".into()));
        }

        let mut joined: Option<AudioClip> = None;
        for chunk in &chunks {
            let bytes = with_retry(self.name(), RETRY_ATTEMPTS, RETRY_DELAY, || {
                self.fetch_chunk(chunk, language.code())
            })
            .await?;
            let clip = decode_mp3(bytes)?;

            match joined.as_mut() {
                None => joined = Some(clip),
                Some(track) => {
                    let clip = resample(&clip, track.sample_rate)?;
                    track.extend(&clip);
                }
            }
        }

        debug!("gtts synthesized {} chunk(s)", chunks.len());
        joined.ok_or_else(|| BackendError::Synthesis("no audio returned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello there", 100), vec!["hello there"]);
    }

    #[test]
    fn test_chunks_break_at_whitespace() {
        let chunks = chunk_text("aaaa bbbb cccc", 9);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 9));
    }

    #[test]
    fn test_oversized_word_is_split_by_chars() {
        let chunks = chunk_text("ab abcdefgh", 3);
        assert_eq!(chunks, vec!["ab", "abc", "def", "gh"]);
    }

    #[test]
    fn test_chunking_counts_tamil_chars() {
        let word = "வணக்கம்";
        let text = vec![word; 30].join(" ");
        for chunk in chunk_text(&text, MAX_CHUNK_CHARS) {
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
        }
    }

    #[tokio::test]
    async fn test_undecodable_audio_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "ta"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 32]))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GttsBackend::with_base_url(Client::new(), server.uri());
        let err = backend
            .try_synthesize("வணக்கம்", Language::Tamil, &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Audio(_)));
    }
}
