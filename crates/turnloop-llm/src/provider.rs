//! The provider-agnostic streaming-chat interface (spec §6.3, §4.9: "LLM
//! transport specifics — the engine sees a streaming-chat abstraction").

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::LlmResult;
use crate::types::{ChatParams, LlmToolDefinition, Message, StreamEvent};

/// A boxed, owned stream of chat events.
pub type StreamBox = Pin<Box<dyn Stream<Item = LlmResult<StreamEvent>> + Send>>;

/// Implemented by every LLM backend the engine can drive.
///
/// The agent loop (C7) only ever sees this trait; it is never aware of
/// HTTP, SSE framing, or any provider-specific request shape.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name, for logging.
    fn name(&self) -> &str;

    /// The model identifier in use.
    fn model(&self) -> &str;

    /// Open a streaming chat call (spec §6.3 `chat(messages, tools, params)`).
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        params: &ChatParams,
    ) -> LlmResult<StreamBox>;

    /// Approximate token count for budget accounting (spec C2 TokenUsage).
    ///
    /// The default is a rough `len / 4` heuristic; providers with an
    /// accurate tokenizer should override it.
    fn count_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }

    /// The provider's context window size, used by C6 compaction
    /// threshold accounting.
    fn max_context_length(&self) -> usize;
}

#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        params: &ChatParams,
    ) -> LlmResult<StreamBox> {
        (**self).chat(messages, tools, params).await
    }

    fn count_tokens(&self, text: &str) -> usize {
        (**self).count_tokens(text)
    }

    fn max_context_length(&self) -> usize {
        (**self).max_context_length()
    }
}

/// Connection and sampling configuration for a provider instance.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Default max tokens to generate, used when a call doesn't override it.
    pub max_tokens: usize,
    /// Default sampling temperature.
    pub temperature: f64,
    /// Override API base URL (proxies, self-hosted gateways).
    pub base_url: Option<String>,
    /// Context window override, when the provider's built-in default is
    /// wrong for this model.
    pub context_window: Option<usize>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("has_base_url", &self.base_url.is_some())
            .field("context_window", &self.context_window)
            .finish()
    }
}

impl ProviderConfig {
    /// Build a config for `model` authenticated with `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.7,
            base_url: None,
            context_window: None,
        }
    }

    /// Set the default max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the default temperature, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = temp.clamp(0.0, 1.0);
        self
    }

    /// Override the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the context window size.
    #[must_use]
    pub fn context_window(mut self, size: usize) -> Self {
        self.context_window = Some(size);
        self
    }
}
