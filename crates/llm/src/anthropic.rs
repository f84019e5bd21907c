//! Anthropic Messages API client.

use async_trait::async_trait;
use pipeline::{Completion, CompletionRequest, EnvConfig, EnvVar, LlmError, LlmProvider};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::types::{ApiError, Message, MessageRequest, MessageResponse};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model used when `CLAUDE_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Single-turn completions against the Messages API.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            endpoint: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Builds a provider from `ANTHROPIC_API_KEY` and `CLAUDE_MODEL`.
    ///
    /// Returns `None` when no API key is configured; stages then use their
    /// deterministic fallbacks.
    pub fn from_env(env: &EnvConfig) -> Option<Self> {
        let api_key = env.get(EnvVar::AnthropicApiKey)?;
        let model = env.get(EnvVar::ClaudeModel).unwrap_or(DEFAULT_MODEL);
        Some(Self::new(api_key, model))
    }

    /// Points the client at a different endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = tracing::field::Empty, max_tokens = request.max_tokens))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let model = request.model.as_deref().unwrap_or(&self.model);
        tracing::Span::current().record("model", model);

        let body = MessageRequest {
            model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&text);
            warn!(status = status.as_u16(), %message, "Anthropic request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion = parse_completion(&text, model)?;
        debug!(chars = completion.text.len(), "Anthropic completion received");
        Ok(completion)
    }
}

/// Extracts the text of a successful Messages API response body.
fn parse_completion(body: &str, requested_model: &str) -> Result<Completion, LlmError> {
    let parsed: MessageResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let text = parsed.text();
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(Completion {
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        text,
    })
}

/// The API's `error.message`, or the raw body when it is not an API error.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => api_error.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_ignores_others() {
        let body = r#"{
            "id": "msg_01",
            "model": "claude-test",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "```schema\nA\n```"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "\n```component\nB\n```"}
            ],
            "usage": {"input_tokens": 1, "output_tokens": 2}
        }"#;

        let completion = parse_completion(body, "fallback-model").unwrap();
        assert_eq!(completion.model, "claude-test");
        assert_eq!(completion.text, "```schema\nA\n```\n```component\nB\n```");
    }

    #[test]
    fn empty_content_is_an_error() {
        let body = r#"{"content": []}"#;
        assert!(matches!(
            parse_completion(body, "m"),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn garbage_is_invalid_response() {
        assert!(matches!(
            parse_completion("<html>", "m"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn api_error_message_is_extracted() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(error_message(body), "Overloaded");
        assert_eq!(error_message("bad gateway"), "bad gateway");
        assert_eq!(error_message(""), "empty response body");
    }

    #[test]
    fn from_env_requires_key_and_defaults_model() {
        assert!(AnthropicProvider::from_env(&EnvConfig::default()).is_none());

        let env = EnvConfig::default().with(EnvVar::AnthropicApiKey, "sk-ant-secret");
        let provider = AnthropicProvider::from_env(&env).unwrap();
        assert_eq!(provider.model(), DEFAULT_MODEL);
        assert!(!format!("{provider:?}").contains("sk-ant-secret"));
    }

    #[tokio::test]
    async fn blank_key_fails_without_network() {
        let provider = AnthropicProvider::new("", DEFAULT_MODEL);
        let result = provider
            .complete(CompletionRequest::new("hello", 16))
            .await;
        assert!(matches!(result, Err(LlmError::MissingApiKey)));
    }
}
