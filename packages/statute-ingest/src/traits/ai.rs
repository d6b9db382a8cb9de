//! Language model trait.
//!
//! The pipeline only needs one capability from a model: a prompt in, a text
//! completion or a typed failure out. Everything model-specific (provider,
//! schema enforcement, retries) lives behind this trait; the pipeline never
//! assumes the returned text is schema-valid JSON.

use async_trait::async_trait;

use crate::error::ModelResult;

/// Text completion over a system prompt and a user prompt.
///
/// Implementations wrap specific providers (OpenAI, Anthropic, ...).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the prompt, returning the raw response text.
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String>;

    /// Model name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<M> {
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String> {
        (**self).complete(system, prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
