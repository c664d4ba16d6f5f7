//! Anthropic Claude provider — the one concrete [`LlmProvider`] this
//! engine ships with (spec Non-goal "LLM transport specifics": the
//! engine itself never depends on this module beyond the trait).

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, ProviderConfig, StreamBox};
use crate::types::{
    ChatParams, LlmToolDefinition, Message, MessageContent, MessageRole, StopReason, StreamEvent,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Claude 3.5/4-era context window; overridden by
/// [`ProviderConfig::context_window`] when set.
const DEFAULT_CONTEXT_WINDOW: usize = 200_000;

/// Anthropic Claude provider, speaking the Messages API directly over
/// `reqwest` with SSE streaming.
pub struct ClaudeProvider {
    client: Client,
    config: ProviderConfig,
}

impl ClaudeProvider {
    /// Build a provider from `config`.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        params: &ChatParams,
        stream: bool,
    ) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(Self::convert_message)
            .collect();

        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": api_messages,
            "stream": stream,
        });

        if !params.system.is_empty() {
            request["system"] = Value::String(params.system.clone());
        }

        if !tools.is_empty() {
            let api_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            request["tools"] = Value::Array(api_tools);
        }

        request
    }

    fn convert_message(message: &Message) -> Value {
        match &message.content {
            MessageContent::Text(text) => {
                serde_json::json!({
                    "role": match message.role {
                        MessageRole::Assistant => "assistant",
                        MessageRole::User | MessageRole::Tool | MessageRole::System => "user",
                    },
                    "content": text,
                })
            },
            MessageContent::ToolCalls(calls) => {
                let content: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "type": "tool_use",
                            "id": c.id,
                            "name": c.name,
                            "input": c.arguments,
                        })
                    })
                    .collect();

                serde_json::json!({
                    "role": "assistant",
                    "content": content,
                })
            },
            MessageContent::ToolResult(result) => {
                serde_json::json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": result.call_id,
                        "content": result.content,
                        "is_error": result.is_error,
                    }],
                })
            },
            MessageContent::MultiPart(parts) => {
                let content: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        crate::types::ContentPart::Text { text } => {
                            serde_json::json!({"type": "text", "text": text})
                        },
                        crate::types::ContentPart::Image { data, media_type } => {
                            serde_json::json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": media_type,
                                    "data": data,
                                }
                            })
                        },
                    })
                    .collect();

                serde_json::json!({
                    "role": match message.role {
                        MessageRole::Assistant => "assistant",
                        MessageRole::User | MessageRole::Tool | MessageRole::System => "user",
                    },
                    "content": content,
                })
            },
        }
    }

    fn stop_reason_from(raw: Option<&str>) -> StopReason {
        match raw {
            Some("max_tokens") => StopReason::Length,
            Some("tool_use") => StopReason::ToolCalls,
            Some("stop_sequence" | "end_turn") | None => StopReason::EndOfTurn,
            Some(_) => StopReason::EndOfTurn,
        }
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[allow(clippy::too_many_lines)]
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        params: &ChatParams,
    ) -> LlmResult<StreamBox> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: "claude".to_string(),
            });
        }

        let request_body = self.build_request(messages, tools, params, true);
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

        debug!(model = self.config.model, "opening Claude stream");

        let mut api_key_header = reqwest::header::HeaderValue::try_from(&self.config.api_key)
            .map_err(|e| LlmError::ConfigError(format!("invalid API key characters: {e}")))?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Claude API error");

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimitExceeded {
                    retry_after_secs: 60,
                });
            }

            return Err(LlmError::ApiRequestFailed(format!(
                "status {status}: {body}"
            )));
        }

        let stream = try_stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut current_tool_id = String::new();

            use futures::StreamExt;

            while let Some(chunk) = bytes_stream.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    #[allow(clippy::arithmetic_side_effects)]
                    let rest_start = event_end + 2;
                    buffer = buffer[rest_start..].to_string();

                    for line in event_data.lines() {
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        if data == "[DONE]" {
                            yield StreamEvent::End(StopReason::EndOfTurn);
                            continue;
                        }

                        let Ok(event) = serde_json::from_str::<StreamingEvent>(data) else { continue };
                        match event {
                            StreamingEvent::ContentBlockStart { content_block, .. } => {
                                if let ContentBlock::ToolUse { id, name, .. } = content_block {
                                    current_tool_id = id.clone();
                                    yield StreamEvent::ToolCallDelta {
                                        id,
                                        name: Some(name),
                                        arguments_fragment: String::new(),
                                    };
                                }
                            },
                            StreamingEvent::ContentBlockDelta { delta, .. } => match delta {
                                Delta::TextDelta { text } => yield StreamEvent::TextDelta(text),
                                Delta::InputJsonDelta { partial_json } => {
                                    yield StreamEvent::ToolCallDelta {
                                        id: current_tool_id.clone(),
                                        name: None,
                                        arguments_fragment: partial_json,
                                    };
                                },
                            },
                            StreamingEvent::ContentBlockStop { .. } => {
                                current_tool_id.clear();
                            },
                            StreamingEvent::MessageDelta { delta, usage } => {
                                if let Some(usage) = usage {
                                    yield StreamEvent::Usage {
                                        input_tokens: 0,
                                        output_tokens: usage.output_tokens,
                                        cumulative_tokens: None,
                                    };
                                }
                                if let Some(reason) = delta.get("stop_reason").and_then(Value::as_str) {
                                    yield StreamEvent::End(ClaudeProvider::stop_reason_from(Some(reason)));
                                }
                            },
                            StreamingEvent::MessageStop => yield StreamEvent::End(StopReason::EndOfTurn),
                            _ => {},
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn max_context_length(&self) -> usize {
        self.config.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[allow(dead_code)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[allow(dead_code)]
        input: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(dead_code)]
enum StreamingEvent {
    MessageStart {
        message: Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: Value,
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: Value,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_api_key_characters_are_rejected() {
        let config = ProviderConfig::new("invalid\nkey", "claude-3-5-sonnet-latest");
        let provider = ClaudeProvider::new(config);
        let Err(err) = provider.chat(&[], &[], &ChatParams::default()).await else {
            panic!("expected error");
        };
        assert!(matches!(err, LlmError::ConfigError(ref msg) if msg.contains("invalid API key characters")));
    }

    #[test]
    fn build_request_includes_system_and_model() {
        let config = ProviderConfig::new("test-key", "claude-3-5-sonnet-latest");
        let provider = ClaudeProvider::new(config);

        let messages = vec![Message::user("hello")];
        let params = ChatParams {
            system: "You are helpful".to_string(),
            ..ChatParams::default()
        };
        let request = provider.build_request(&messages, &[], &params, false);

        assert_eq!(request["model"], "claude-3-5-sonnet-latest");
        assert_eq!(request["system"], "You are helpful");
        assert!(!request["stream"].as_bool().unwrap());
    }

    #[test]
    fn convert_message_maps_user_text() {
        let msg = Message::user("hello");
        let converted = ClaudeProvider::convert_message(&msg);
        assert_eq!(converted["role"], "user");
        assert_eq!(converted["content"], "hello");
    }

    #[test]
    fn stop_reason_mapping() {
        assert_eq!(
            ClaudeProvider::stop_reason_from(Some("max_tokens")),
            StopReason::Length
        );
        assert_eq!(
            ClaudeProvider::stop_reason_from(Some("tool_use")),
            StopReason::ToolCalls
        );
        assert_eq!(ClaudeProvider::stop_reason_from(None), StopReason::EndOfTurn);
    }
}
