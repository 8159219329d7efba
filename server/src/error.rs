use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mixtts_core::{ExtractError, JobError};
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Extract(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Job(e) => match e {
                JobError::NotFound(_) => (StatusCode::NOT_FOUND, "Job not found".to_string()),
                JobError::NotFinished(_) => (StatusCode::BAD_REQUEST, "Job not finished".to_string()),
                JobError::NoContent => (StatusCode::BAD_REQUEST, e.to_string()),
                JobError::Failed(_) => {
                    tracing::error!("Conversion error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
