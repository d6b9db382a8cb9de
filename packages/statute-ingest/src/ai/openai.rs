//! OpenAI implementation of the LanguageModel trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use statute_ingest::ai::OpenAI;
//!
//! let model = OpenAI::new(api_key).with_model("gpt-4o");
//! let extractor = StructuredExtractor::new(model);
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestError, ModelError, ModelResult, Result};
use crate::traits::ai::LanguageModel;

/// OpenAI chat-completions model.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    api_key: Arc<SecretString>,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAI {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key: Arc::new(api_key),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 16_384,
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| IngestError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(SecretString::from(api_key)))
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Cap on completion tokens (default: 16384). Full statutes are long.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAI {
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Malformed("response has no choices".to_string()))?;

        debug!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
            "OpenAI completion received"
        );

        into_text(choice)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: StatusCode, body: String) -> ModelError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ModelError::Timeout,
        _ => ModelError::transport(format!("OpenAI API error ({}): {}", status.as_u16(), body)),
    }
}

fn into_text(choice: ChatChoice) -> ModelResult<String> {
    if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
        return Err(ModelError::Refused(refusal));
    }
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ModelError::Refused("content filtered".to_string()));
    }
    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ModelError::Malformed("empty completion".to_string()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(json: &str) -> ChatChoice {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_openai_builder() {
        let model = OpenAI::new(SecretString::from("sk-test".to_string()))
            .with_model("gpt-4o-mini")
            .with_base_url("https://custom.api.com/")
            .with_max_tokens(1024);

        assert_eq!(model.model(), "gpt-4o-mini");
        assert_eq!(model.name(), "gpt-4o-mini");
        assert_eq!(model.base_url, "https://custom.api.com");
        assert_eq!(model.max_tokens, 1024);
    }

    #[test]
    fn test_refusal_maps_to_refused() {
        let err = into_text(choice(
            r#"{"message": {"content": null, "refusal": "I can't help with that."}, "finish_reason": "stop"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ModelError::Refused(_)));
    }

    #[test]
    fn test_content_filter_maps_to_refused() {
        let err = into_text(choice(
            r#"{"message": {"content": ""}, "finish_reason": "content_filter"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ModelError::Refused(_)));
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let err = into_text(choice(r#"{"message": {"content": "  "}}"#)).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn test_text_passes_through() {
        let text = into_text(choice(r#"{"message": {"content": "{\"a\": 1}"}}"#)).unwrap();
        assert_eq!(text, r#"{"a": 1}"#);
    }

    #[test]
    fn test_gateway_timeout_is_timeout() {
        assert!(matches!(
            classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()),
            ModelError::Timeout
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string()),
            ModelError::Transport(_)
        ));
    }
}
