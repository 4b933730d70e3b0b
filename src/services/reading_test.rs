use super::*;
use crate::error::ErrorCode;
use crate::image::test_helpers::jpeg_url;
use crate::llm::types::{ChatResponse, Content};
use std::sync::Mutex;

// =========================================================================
// MockLlm
// =========================================================================

/// Records every request and replies with a canned text or error.
struct MockLlm {
    reply: Result<String, u16>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    fn text(text: &str) -> Self {
        Self { reply: Ok(text.into()), seen: Mutex::new(Vec::new()) }
    }

    fn failing(status: u16) -> Self {
        Self { reply: Err(status), seen: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, _max_tokens: u32, _system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        match &self.reply {
            Ok(text) => Ok(ChatResponse {
                content: vec![ContentBlock::Text { text: text.clone() }],
                model: "mock".into(),
                stop_reason: "end_turn".into(),
                input_tokens: 0,
                output_tokens: 0,
            }),
            Err(status) => Err(LlmError::ApiResponse { status: *status, body: "boom".into() }),
        }
    }
}

// =========================================================================
// ImagePayload
// =========================================================================

#[test]
fn payload_strips_data_url_prefix() {
    let payload = ImagePayload::from_image_data("data:image/png;base64,AAAA").unwrap();
    assert_eq!(payload, ImagePayload { media_type: "image/png".into(), data: "AAAA".into() });
}

#[test]
fn payload_accepts_bare_base64_as_jpeg() {
    let payload = ImagePayload::from_image_data("  AAAA  ").unwrap();
    assert_eq!(payload.media_type, "image/jpeg");
    assert_eq!(payload.data, "AAAA");
}

#[test]
fn payload_defaults_blank_mime() {
    let payload = ImagePayload::from_image_data("data:;base64,AAAA").unwrap();
    assert_eq!(payload.media_type, "image/jpeg");
}

#[test]
fn payload_rejects_empty_data() {
    assert!(ImagePayload::from_image_data("").is_none());
    assert!(ImagePayload::from_image_data("data:image/png;base64,").is_none());
    assert!(ImagePayload::from_image_data("data:image/png;base64").is_none());
}

#[test]
fn payload_from_data_url() {
    let url = jpeg_url();
    let payload = ImagePayload::from(&url);
    assert_eq!(payload.media_type, "image/jpeg");
    assert_eq!(payload.data, url.payload());
}

// =========================================================================
// Prompt + fallback
// =========================================================================

#[test]
fn prompt_covers_lines_mounts_and_length() {
    let prompt = build_prompt();
    for needle in ["Heart line", "Head line", "Life line", "Fate line", "mounts", "180-200 words", "uplifting", "emojis"] {
        assert!(prompt.contains(needle), "prompt missing {needle:?}");
    }
}

#[test]
fn fallback_replaces_blank_text() {
    assert_eq!(reading_or_fallback(""), FALLBACK_READING);
    assert_eq!(reading_or_fallback(" \n "), FALLBACK_READING);
    assert_eq!(reading_or_fallback(" hello "), "hello");
}

// =========================================================================
// ReadingService
// =========================================================================

#[tokio::test]
async fn service_sends_prompt_then_image() {
    let llm = Arc::new(MockLlm::text("A bright future ✨"));
    let service = ReadingService::new(llm.clone(), DEFAULT_READING_MAX_TOKENS);
    let reading = service.generate(&jpeg_url()).await.unwrap();
    assert_eq!(reading, "A bright future ✨");

    let seen = llm.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let Content::Blocks(blocks) = &seen[0][0].content else {
        panic!("expected block content");
    };
    assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == build_prompt()));
    assert!(matches!(&blocks[1], ContentBlock::Image { source } if source.media_type == "image/jpeg"));
}

#[tokio::test]
async fn service_substitutes_fallback_for_empty_reply() {
    let service = ReadingService::new(Arc::new(MockLlm::text("")), DEFAULT_READING_MAX_TOKENS);
    let payload = ImagePayload::from_image_data("data:image/jpeg;base64,AAAA").unwrap();
    assert_eq!(service.generate_payload(&payload).await.unwrap(), FALLBACK_READING);
}

#[tokio::test]
async fn service_surfaces_upstream_error() {
    let service = ReadingService::new(Arc::new(MockLlm::failing(503)), DEFAULT_READING_MAX_TOKENS);
    let err = service.generate(&jpeg_url()).await.unwrap_err();
    assert!(matches!(err, GenerationError::Upstream(_)));
    assert!(err.retryable());
    assert_eq!(err.error_code(), "E_GENERATION_UPSTREAM");
}

#[test]
fn client_side_service_errors_are_not_retryable() {
    let err = GenerationError::Service { status: 400, message: "bad".into() };
    assert!(!err.retryable());
    assert!(GenerationError::Timeout(5).retryable());
}
