//! Reading service — palm image in, narrative reading out.
//!
//! DESIGN
//! ======
//! [`ReadingGenerator`] is the seam the capture workflow depends on. The
//! server uses [`ReadingService`], which talks to the LLM directly; clients
//! use [`super::analyze_client::AnalyzeClient`], which goes through
//! `POST /api/analyze` so provider keys stay on the server.
//!
//! Both guarantee a non-empty reading: an empty model answer becomes
//! [`FALLBACK_READING`].

use std::sync::Arc;

use tracing::info;

use crate::error::ErrorCode;
use crate::image::DataUrl;
use crate::llm::LlmChat;
use crate::llm::types::{ContentBlock, ImageSource, LlmError, Message};

pub const FALLBACK_READING: &str = "Could not generate a valid response. Please try again.";
pub const DEFAULT_READING_MAX_TOKENS: u32 = 1024;

/// Media type assumed when the caller sends bare base64 without a prefix.
const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("reading generator not configured")]
    NotConfigured,
    #[error("upstream generation failed: {0}")]
    Upstream(#[from] LlmError),
    #[error("analyze request failed: {0}")]
    Transport(String),
    #[error("analyze service returned status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

impl ErrorCode for GenerationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_GENERATOR_NOT_CONFIGURED",
            Self::Upstream(_) => "E_GENERATION_UPSTREAM",
            Self::Transport(_) => "E_GENERATION_TRANSPORT",
            Self::Service { .. } => "E_GENERATION_SERVICE",
            Self::Timeout(_) => "E_GENERATION_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Upstream(e) => e.retryable(),
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::NotConfigured => false,
        }
    }
}

/// Produces a reading for an image that has already passed hand validation.
#[async_trait::async_trait]
pub trait ReadingGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`GenerationError`] on any transport or upstream failure.
    async fn generate(&self, image: &DataUrl) -> Result<String, GenerationError>;
}

/// Image bytes as sent upstream: media type plus bare base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub media_type: String,
    pub data: String,
}

impl ImagePayload {
    /// Strip any `data:<mime>;base64,` prefix from client-supplied image data.
    ///
    /// Bare base64 is accepted and assumed to be JPEG. Returns `None` when no
    /// payload remains.
    #[must_use]
    pub fn from_image_data(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (media_type, data) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',')?;
                let mime = header
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_MEDIA_TYPE);
                (mime, data)
            }
            None => (DEFAULT_MEDIA_TYPE, raw),
        };
        if data.is_empty() {
            return None;
        }
        Some(Self { media_type: media_type.to_string(), data: data.to_string() })
    }
}

impl From<&DataUrl> for ImagePayload {
    fn from(url: &DataUrl) -> Self {
        Self { media_type: url.media_type().to_string(), data: url.payload().to_string() }
    }
}

// =============================================================================
// PROMPT
// =============================================================================

/// The fixed palm-reading instructions sent with every image.
#[must_use]
pub fn build_prompt() -> &'static str {
    "You are a mystical palm reader with ancient wisdom. I'm showing you an image of someone's palm. \
Please analyze the palm lines, mounts, and other features visible in the image to provide an insightful palm reading.

Look for these key elements in the palm:
- Heart line (love and relationships)
- Head line (intellect and decision-making)
- Life line (vitality and life path)
- Fate line (career and destiny)
- Palm mounts (personality traits)
- Hand shape and finger characteristics

Provide a unique and personalized palm reading covering love, career, health, and future prospects. \
Be imaginative and specific, avoiding generic phrases. Use a warm, empathetic tone with mystical flair.

Your response should be 180-200 words, complete, and end with an uplifting conclusion. \
Include relevant emojis to add magical ambiance. ✨🔮"
}

/// Replace an empty or whitespace-only reading with [`FALLBACK_READING`].
#[must_use]
pub fn reading_or_fallback(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() { FALLBACK_READING.to_string() } else { trimmed.to_string() }
}

// =============================================================================
// LLM-BACKED SERVICE
// =============================================================================

pub struct ReadingService {
    llm: Arc<dyn LlmChat>,
    max_tokens: u32,
}

impl ReadingService {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmChat>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    /// Ask the model for a reading of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Upstream`] if the provider call fails.
    pub async fn generate_payload(&self, image: &ImagePayload) -> Result<String, GenerationError> {
        let messages = [Message::user_blocks(vec![
            ContentBlock::Text { text: build_prompt().to_string() },
            ContentBlock::Image { source: ImageSource::base64(image.media_type.clone(), image.data.clone()) },
        ])];

        let response = self.llm.chat(self.max_tokens, "", &messages).await?;
        info!(
            model = %response.model,
            stop_reason = %response.stop_reason,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "reading: generated"
        );

        Ok(reading_or_fallback(&response.text()))
    }
}

#[async_trait::async_trait]
impl ReadingGenerator for ReadingService {
    async fn generate(&self, image: &DataUrl) -> Result<String, GenerationError> {
        self.generate_payload(&ImagePayload::from(image)).await
    }
}

#[cfg(test)]
#[path = "reading_test.rs"]
mod tests;
