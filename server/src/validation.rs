use crate::error::ApiError;

/// Longest accepted job id (ids are 32 hex chars today).
const MAX_JOB_ID_LENGTH: usize = 64;

/// Validate text submitted for conversion
pub fn validate_text(text: &str, max_length: usize) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    let length = text.chars().count();
    if length > max_length {
        return Err(ApiError::InvalidInput(format!(
            "Text too long ({} characters, max {})",
            length, max_length
        )));
    }
    Ok(())
}

/// Validate job id format
pub fn validate_job_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.len() > MAX_JOB_ID_LENGTH {
        return Err(ApiError::InvalidInput("Invalid job id".to_string()));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ApiError::InvalidInput(format!("Invalid job id: {}", id)));
    }
    Ok(())
}
