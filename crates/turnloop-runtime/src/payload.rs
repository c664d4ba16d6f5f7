//! Kind-specific JSON payload shapes for each [`turnloop_core::EventKind`]
//! (spec §6.1: `"payload": { ... kind-specific ... }`).
//!
//! These are this engine's own wire format — the spec leaves the payload
//! shape unspecified beyond "kind-specific" and no `original_source` exists
//! to crib an exact shape from, so the fields here are the minimum needed
//! to round-trip a [`crate::conversation::Conversation`] through the log.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for a `user` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    /// The user's message text.
    pub text: String,
}

/// Payload for a `system` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPayload {
    /// The system note's text.
    pub text: String,
}

/// Payload for an `assistant` event. Present only when the assistant
/// produced visible text this step; a tool-calls-only step still writes
/// an assistant event with `text: None` so the turn's event order is
/// unambiguous.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantPayload {
    /// Assistant-visible text, if any was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Payload for a `tool_call` event — one per requested call (spec §3
/// invariant (b): every `tool_result` has a `tool_call` ancestor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    /// Call id, correlated with the eventual `tool_result`.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Value,
}

/// Payload for a `tool_result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// The `tool_call` id this result answers.
    pub tool_call_id: String,
    /// Result content (the normalized `llm_content`).
    pub content: String,
    /// Whether the invocation failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Payload for a `compact_summary` event (spec §4.6 step 8: "a
/// `compact_summary` user-role event whose content is the summary").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactSummaryPayload {
    /// The summarized content, standing in for everything before the
    /// paired `compact_boundary`.
    pub text: String,
}
