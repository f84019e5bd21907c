//! Large-language-model provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Overrides the provider's configured model when set.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: None,
            max_tokens,
            prompt: prompt.into(),
        }
    }
}

/// The text returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub model: String,
    pub text: String,
}

/// Failures of an LLM call. Every variant is non-retryable from the
/// pipeline's point of view; callers fall back instead.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API key is not configured")]
    MissingApiKey,

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("LLM response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("LLM response contained no text")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider label used in logs and reports (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}
