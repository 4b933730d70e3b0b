//! HTTP client for `POST /api/analyze`.
//!
//! The capture workflow on a client device uses this generator so provider
//! API keys never leave the server.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::reading::{GenerationError, ReadingGenerator, reading_or_fallback};
use crate::image::DataUrl;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    image_data: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    reading: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeErrorBody {
    error: String,
}

pub struct AnalyzeClient {
    http: reqwest::Client,
    url: String,
}

impl AnalyzeClient {
    /// `base_url` is the server origin, e.g. `http://localhost:3000`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self { http, url: format!("{}/api/analyze", base_url.trim_end_matches('/')) })
    }
}

#[async_trait::async_trait]
impl ReadingGenerator for AnalyzeClient {
    async fn generate(&self, image: &DataUrl) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(&self.url)
            .json(&AnalyzeRequest { image_data: image.as_str() })
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if status != 200 {
            let message = serde_json::from_str::<AnalyzeErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(GenerationError::Service { status, message });
        }

        let body: AnalyzeResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Transport(format!("invalid analyze response: {e}")))?;
        info!(bytes = image.len(), "analyze: reading received");
        Ok(reading_or_fallback(body.reading.as_deref().unwrap_or_default()))
    }
}

#[cfg(test)]
#[path = "analyze_client_test.rs"]
mod tests;
