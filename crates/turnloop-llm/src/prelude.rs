//! Convenience re-exports. `use turnloop_llm::prelude::*;`

pub use crate::{
    ChatParams, ClaudeProvider, ContentPart, LlmError, LlmProvider, LlmResult, LlmToolDefinition,
    Message, MessageContent, MessageRole, ProviderConfig, StopReason, StreamBox, StreamEvent,
    ToolCall, ToolCallResult,
};
