//! The user-facing ask step (spec §4.3 step 5) and its response vocabulary.
//!
//! Grounded in the teacher's `astrid-approval::manager::ApprovalHandler`:
//! the engine never talks to a UI directly, it calls through a trait the
//! runtime implements on top of the event bus. This keeps
//! `turnloop-permission` free of any dependency on `turnloop-events`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mode::ToolKind;

/// A proposed tool call awaiting a permission decision.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// The tool's registered name.
    pub tool_name: String,
    /// The tool's kind, for mode short-circuiting.
    pub kind: ToolKind,
    /// The canonical pattern produced by the tool's own
    /// `permission_rule_abstractor` (spec §6.2), e.g.
    /// `Bash(command:git status)`.
    pub canonical_pattern: String,
    /// The raw arguments, forwarded to hooks and to the prompt so a human
    /// can inspect exactly what will run.
    pub raw_arguments: serde_json::Value,
}

impl ToolCallRequest {
    /// Build a request.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        kind: ToolKind,
        canonical_pattern: impl Into<String>,
        raw_arguments: serde_json::Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            kind,
            canonical_pattern: canonical_pattern.into(),
            raw_arguments,
        }
    }
}

/// The response options a user may give when prompted (spec §4.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptResponse {
    /// Allow this one call only.
    AllowOnce,
    /// Allow this call and remember the canonical pattern for the
    /// session.
    AllowAlways,
    /// Reject this one call only.
    RejectOnce,
    /// Reject this call and record a session deny rule for the pattern.
    RejectAlways,
}

/// The outcome of asking the user, exposed to callers of
/// [`PermissionEngine::decide`](crate::engine::PermissionEngine::decide).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user responded.
    Responded(PromptResponse),
    /// No response arrived before the timeout; treated as `reject_once`
    /// (spec §6.4).
    TimedOut,
}

/// Implemented by the runtime to surface a permission request to the
/// user (typically by publishing a `permission_request` event and
/// awaiting the front-end's reply).
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Present `request` to the user and wait for a response.
    ///
    /// Returns `None` if the front-end is not connected; the engine
    /// applies its own timeout around this call, so implementations
    /// should not need to enforce one themselves.
    async fn prompt(&self, request: &ToolCallRequest) -> Option<PromptResponse>;
}
