//! Common utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use mixtts_core::{
    AssemblerConfig, AudioAssembler, AudioClip, BackendError, JobOrchestrator, Language, LanguageDetector,
    OrchestratorSettings, SynthesisBackend, SynthesisCascade, VoiceConfig,
};
use mixtts_server::{build_router, config::ServerConfig, AppState};
use tower::ServiceExt;

pub const RATE: u32 = 8_000;

/// Treats every undecided word as English.
pub struct EnglishDetector;

impl LanguageDetector for EnglishDetector {
    fn detect(&self, _word: &str) -> Option<Language> {
        Some(Language::English)
    }
}

/// Returns half a second of constant tone, optionally after a delay.
pub struct ToneBackend {
    pub delay: Duration,
}

#[async_trait]
impl SynthesisBackend for ToneBackend {
    fn name(&self) -> &str {
        "tone"
    }

    async fn try_synthesize(&self, _: &str, _: Language, _: &VoiceConfig) -> Result<AudioClip, BackendError> {
        tokio::time::sleep(self.delay).await;
        Ok(AudioClip::new(vec![0.25; RATE as usize / 2], RATE))
    }
}

pub struct FailingBackend;

#[async_trait]
impl SynthesisBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn try_synthesize(&self, _: &str, _: Language, _: &VoiceConfig) -> Result<AudioClip, BackendError> {
        Err(BackendError::Synthesis("service unavailable".into()))
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        rate_limit_per_minute: 100_000,
        max_text_length: 500,
        ..ServerConfig::default()
    }
}

pub fn app_with(backends: Vec<Arc<dyn SynthesisBackend>>, tempo: f32) -> Router {
    let cascade = SynthesisCascade::new(backends, VoiceConfig::default(), Duration::from_secs(5));
    let assembler = AudioAssembler::new(AssemblerConfig {
        boundary_gap_ms: 200,
        tempo,
        output_sample_rate: RATE,
    });
    let orchestrator = JobOrchestrator::new(
        cascade,
        assembler,
        Arc::new(EnglishDetector),
        OrchestratorSettings::default(),
    );
    build_router(AppState::new(orchestrator, test_config())).expect("router")
}

/// Create a test app with a fast, always-succeeding backend
pub fn create_test_app() -> Router {
    app_with(vec![Arc::new(ToneBackend { delay: Duration::ZERO })], 1.0)
}

pub fn slow_app() -> Router {
    app_with(vec![Arc::new(ToneBackend { delay: Duration::from_millis(400) })], 1.0)
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    (status, body)
}

const BOUNDARY: &str = "----mixtts-test-boundary";

/// A multipart request with optional `text` and `file` parts.
pub fn multipart_request(uri: &str, text: Option<&str>, file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(text) = text {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n").as_bytes(),
        );
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub async fn submit(app: &Router, text: &str) -> String {
    let (status, body) = post_json(app, "/convert_async", serde_json::json!({ "text": text })).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    json["job_id"].as_str().unwrap().to_string()
}

/// Poll `/progress` until the job is terminal, returning every snapshot seen.
pub async fn wait_for_job(app: &Router, job_id: &str) -> Vec<serde_json::Value> {
    let mut seen = Vec::new();
    for _ in 0..500 {
        let (status, _, body) = get(app, &format!("/progress/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let done = matches!(
            snapshot["status"].as_str(),
            Some("finished") | Some("error") | Some("cancelled")
        );
        seen.push(snapshot);
        if done {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}
