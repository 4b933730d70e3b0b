//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the reading service, absent when no LLM provider is configured, and
//! the per-request generation deadline.

use std::sync::Arc;
use std::time::Duration;

use crate::services::reading::ReadingService;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the LLM key is missing; `/api/analyze` then answers 503.
    pub reading: Option<Arc<ReadingService>>,
    pub analyze_timeout: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(reading: Option<Arc<ReadingService>>, analyze_timeout: Duration) -> Self {
        Self { reading, analyze_timeout }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::llm::LlmChat;
    use crate::llm::types::{ChatResponse, ContentBlock, LlmError, Message};
    use crate::services::reading::DEFAULT_READING_MAX_TOKENS;

    /// Canned LLM: a fixed text, an upstream error, or a hang.
    pub enum MockLlm {
        Text(String),
        Fail,
        Hang,
    }

    #[async_trait::async_trait]
    impl LlmChat for MockLlm {
        async fn chat(&self, _max_tokens: u32, _system: &str, _messages: &[Message]) -> Result<ChatResponse, LlmError> {
            match self {
                Self::Text(text) => Ok(ChatResponse {
                    content: vec![ContentBlock::Text { text: text.clone() }],
                    model: "mock".into(),
                    stop_reason: "end_turn".into(),
                    input_tokens: 0,
                    output_tokens: 0,
                }),
                Self::Fail => Err(LlmError::ApiResponse { status: 500, body: "upstream exploded".into() }),
                Self::Hang => {
                    std::future::pending::<()>().await;
                    Err(LlmError::ApiRequest("unreachable".into()))
                }
            }
        }
    }

    /// App state backed by a [`MockLlm`].
    #[must_use]
    pub fn test_app_state(llm: MockLlm) -> AppState {
        let service = ReadingService::new(Arc::new(llm), DEFAULT_READING_MAX_TOKENS);
        AppState::new(Some(Arc::new(service)), Duration::from_secs(5))
    }

    /// App state with no LLM configured.
    #[must_use]
    pub fn unconfigured_app_state() -> AppState {
        AppState::new(None, Duration::from_secs(5))
    }
}
