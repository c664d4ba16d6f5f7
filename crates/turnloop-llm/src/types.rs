//! Message, tool-schema, and streaming-event types (spec §6.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in the conversation sent to/received from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: MessageContent,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::ToolCalls(tool_calls),
        }
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::ToolResult(result),
        }
    }

    /// Text content, if this is a plain-text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Tool calls, if this is a tool-call message.
    #[must_use]
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match &self.content {
            MessageContent::ToolCalls(calls) => Some(calls),
            _ => None,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions.
    System,
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
    /// Tool result.
    Tool,
}

/// Message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Assistant tool calls.
    ToolCalls(Vec<ToolCall>),
    /// A tool result.
    ToolResult(ToolCallResult),
    /// Multi-part content (text and/or images).
    MultiPart(Vec<ContentPart>),
}

/// One part of multi-part message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
    /// Image content.
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type.
        media_type: String,
    },
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call id, correlated with its eventual `ToolCallResult`.
    pub id: String,
    /// Tool name (native, or `mcp__<server>__<tool>`).
    pub name: String,
    /// Tool arguments.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call with empty arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach arguments.
    #[must_use]
    pub fn with_arguments(mut self, args: Value) -> Self {
        self.arguments = args;
        self
    }
}

/// Result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The call id this is responding to.
    pub call_id: String,
    /// Result content shown to the LLM.
    pub content: String,
    /// Whether this result represents an error.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Build a successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Build an error result.
    pub fn error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: error.into(),
            is_error: true,
        }
    }
}

/// A tool schema offered to the LLM (spec §6.2 `schema`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description shown to the model.
    pub description: Option<String>,
    /// JSON-Schema for the tool's arguments.
    pub input_schema: Value,
}

impl LlmToolDefinition {
    /// Create a tool definition with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Sampling and generation parameters for one `chat` call.
#[derive(Debug, Clone)]
pub struct ChatParams {
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// System prompt text, if any.
    pub system: String,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            system: String::new(),
        }
    }
}

/// Streaming event from the LLM (spec §6.3: `text_delta`, `reasoning_delta`,
/// `tool_call_delta`, `usage`, `end`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Partial assistant text.
    TextDelta(String),
    /// Partial chain-of-thought/reasoning text.
    ReasoningDelta(String),
    /// A fragment of a tool call's arguments (and, on the first fragment,
    /// its name).
    ToolCallDelta {
        /// Call id, stable across all fragments for one call.
        id: String,
        /// Tool name, present only on the first fragment for this id.
        name: Option<String>,
        /// Raw JSON text fragment to append to the call's argument buffer.
        arguments_fragment: String,
    },
    /// Token usage, reported at least once before `End`.
    Usage {
        /// Input tokens for this call.
        input_tokens: usize,
        /// Output tokens generated so far.
        output_tokens: usize,
        /// Cumulative tokens across the whole conversation, if known.
        cumulative_tokens: Option<usize>,
    },
    /// The stream has ended.
    End(StopReason),
}

/// Why the model stopped generating (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the assistant's turn.
    EndOfTurn,
    /// The model requested tool calls.
    ToolCalls,
    /// Hit the output length limit.
    Length,
    /// The provider's content filter intervened.
    ContentFilter,
    /// The stream ended abnormally.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_round_trip_text() {
        let user = Message::user("hello");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.text(), Some("hello"));

        let assistant = Message::assistant("hi");
        assert_eq!(assistant.role, MessageRole::Assistant);
    }

    #[test]
    fn tool_call_carries_arguments() {
        let call = ToolCall::new("1", "Bash").with_arguments(serde_json::json!({"command": "ls"}));
        assert_eq!(call.arguments["command"], "ls");
    }

    #[test]
    fn tool_result_error_flag() {
        let ok = ToolCallResult::success("1", "done");
        assert!(!ok.is_error);
        let err = ToolCallResult::error("1", "boom");
        assert!(err.is_error);
    }
}
