//! `POST /api/analyze` — image in, palm reading out.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::ErrorCode;
use crate::services::reading::{GenerationError, ImagePayload};
use crate::state::AppState;

pub const MSG_IMAGE_REQUIRED: &str = "Image data is required.";
pub const MSG_GENERATION_FAILED: &str = "Internal server error generating reading.";
pub const MSG_NOT_CONFIGURED: &str = "Reading service is not configured.";

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("request body is not JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("imageData missing, not a string, or empty")]
    MissingImageData,
}

impl ErrorCode for InputError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotJson(_) => "E_INPUT_NOT_JSON",
            Self::MissingImageData => "E_INPUT_IMAGE_REQUIRED",
        }
    }
}

#[derive(Serialize)]
struct ReadingBody {
    reading: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

/// Pull `imageData` out of a raw request body.
///
/// # Errors
///
/// Returns [`InputError`] unless the body is a JSON object with a non-empty
/// string `imageData`.
pub fn parse_request(body: &[u8]) -> Result<ImagePayload, InputError> {
    let value: Value = serde_json::from_slice(body)?;
    value
        .get("imageData")
        .and_then(Value::as_str)
        .and_then(ImagePayload::from_image_data)
        .ok_or(InputError::MissingImageData)
}

pub async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match parse_request(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "analyze: bad request");
            return error_response(StatusCode::BAD_REQUEST, MSG_IMAGE_REQUIRED);
        }
    };

    let Some(service) = &state.reading else {
        let e = GenerationError::NotConfigured;
        error!(code = e.error_code(), "analyze: no LLM provider configured");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, MSG_NOT_CONFIGURED);
    };

    info!(media_type = %payload.media_type, bytes = payload.data.len(), "analyze: generating reading");
    let result = match tokio::time::timeout(state.analyze_timeout, service.generate_payload(&payload)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(state.analyze_timeout.as_secs())),
    };

    match result {
        Ok(reading) => Json(ReadingBody { reading }).into_response(),
        Err(e) => {
            error!(code = e.error_code(), retryable = e.retryable(), error = %e, "analyze: generation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_GENERATION_FAILED)
        }
    }
}

#[cfg(test)]
#[path = "analyze_test.rs"]
mod tests;
