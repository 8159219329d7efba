//! Route handlers.

use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mixtts_core::{extract_text, wav_base64, FileKind, JobId, JobSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::metrics::{EndpointMetricsResponse, MetricsResponse, SystemMetrics};
use crate::validation::{validate_job_id, validate_text};
use crate::{uptime_seconds, AppState};

pub const DOWNLOAD_FILENAME: &str = "mixed_tts_output.wav";

#[derive(Deserialize)]
pub struct TextRequest {
    text: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    job_id: JobId,
}

#[derive(Serialize)]
pub struct TtsResponse {
    job_id: JobId,
    audio_base64: String,
    duration_ms: u64,
    sample_rate: u32,
    segments: usize,
}

#[derive(Serialize)]
pub struct EnginesResponse {
    engines: Vec<String>,
}

/// Text to convert, from a JSON body `{"text": ...}` or a multipart form with
/// a `text` field or an uploaded `.txt`/`.docx` `file`.
pub struct ConversionInput {
    pub text: String,
}

impl<S> FromRequest<S> for ConversionInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidInput(e.body_text()))?;
            read_form(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<TextRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidInput(e.body_text()))?;
            Ok(Self { text: body.text })
        } else {
            Err(ApiError::InvalidInput(
                "Expected a multipart form or a JSON body with a 'text' field".to_string(),
            ))
        }
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ConversionInput, ApiError> {
    let mut text = None;
    let mut file_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidInput(e.body_text()))?;
                if bytes.is_empty() {
                    continue;
                }
                let kind = FileKind::from_filename(&file_name)?;
                info!("Extracting text from upload '{}' ({} bytes)", file_name, bytes.len());
                file_text = Some(extract_text(&bytes, kind)?);
            }
            Some("text") => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidInput(e.body_text()))?,
                );
            }
            _ => {}
        }
    }

    // An uploaded file wins over the text field
    file_text
        .or(text)
        .map(|text| ConversionInput { text })
        .ok_or_else(|| ApiError::InvalidInput("Provide either 'text' or a 'file'".to_string()))
}

fn parse_job_id(raw: String) -> Result<JobId, ApiError> {
    validate_job_id(&raw)?;
    Ok(JobId::from(raw))
}

fn wav_attachment(wav: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
            ),
        ],
        wav,
    )
        .into_response()
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_engines(State(state): State<AppState>) -> Json<EnginesResponse> {
    Json(EnginesResponse {
        engines: state.orchestrator.cascade().backend_names(),
    })
}

pub async fn convert_async(
    State(state): State<AppState>,
    input: ConversionInput,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_text(&input.text, state.config.max_text_length)?;

    let job_id = state.orchestrator.submit(input.text)?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let id = parse_job_id(job_id)?;
    Ok(Json(state.orchestrator.progress(&id)?))
}

pub async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let id = parse_job_id(job_id)?;
    let artifact = state.orchestrator.result(&id)?;
    Ok(wav_attachment(artifact.wav.clone()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let id = parse_job_id(job_id)?;
    Ok(Json(state.orchestrator.cancel(&id)?))
}

pub async fn convert_sync(
    State(state): State<AppState>,
    input: ConversionInput,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_text(&input.text, state.config.max_text_length)?;

    let start = Instant::now();
    match state.orchestrator.synthesize_sync(input.text).await {
        Ok(output) => {
            state.metrics.convert.record_request(start.elapsed().as_millis() as u64);
            Ok(wav_attachment(output.artifact.wav.clone()))
        }
        Err(e) => {
            state.metrics.convert.record_error();
            warn!("Synchronous conversion failed: {e}");
            Err(e.into())
        }
    }
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    input: ConversionInput,
) -> Result<Json<TtsResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_text(&input.text, state.config.max_text_length)?;

    let start = Instant::now();
    let output = match state.orchestrator.synthesize_sync(input.text).await {
        Ok(output) => output,
        Err(e) => {
            state.metrics.tts.record_error();
            return Err(e.into());
        }
    };
    state.metrics.tts.record_request(start.elapsed().as_millis() as u64);

    let artifact = output.artifact;
    Ok(Json(TtsResponse {
        job_id: output.job_id,
        audio_base64: wav_base64(&artifact.wav),
        duration_ms: artifact.duration_ms,
        sample_rate: artifact.sample_rate,
        segments: artifact.segments,
    }))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let request_count = state.request_count.load(Ordering::Relaxed);
    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics::collect(request_count, uptime_seconds()),
        endpoints: EndpointMetricsResponse {
            convert: state.metrics.convert.stats(),
            tts: state.metrics.tts.stats(),
        },
        jobs: state.orchestrator.registry().counts(),
        backends: state.orchestrator.cascade().stats(),
    })
}
