//! Hook lifecycle events shared across crates.
//!
//! Lives in `turnloop-core` so both `turnloop-hooks` and `turnloop-runtime`
//! can reference it without a circular dependency, following the same
//! placement the teacher uses for its `HookEvent`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle moments at which a hook may be invoked (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// A new session has started.
    SessionStart,
    /// A session is ending.
    SessionEnd,
    /// The user has submitted a prompt.
    UserPromptSubmit,
    /// Before a tool call is executed.
    PreToolUse,
    /// After a tool call completes successfully.
    PostToolUse,
    /// A tool call failed.
    PostToolUseFailure,
    /// A permission decision is about to be requested from the user.
    PermissionRequest,
    /// The turn (or a sub-agent turn) is about to stop.
    Stop,
    /// A sub-agent turn is about to stop.
    SubagentStop,
    /// A notification is about to be delivered to the front-end.
    Notification,
    /// Before context compaction runs.
    Compaction,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::UserPromptSubmit => "user_prompt_submit",
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::PostToolUseFailure => "post_tool_use_failure",
            Self::PermissionRequest => "permission_request",
            Self::Stop => "stop",
            Self::SubagentStop => "subagent_stop",
            Self::Notification => "notification",
            Self::Compaction => "compaction",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_snake_case_serde_name() {
        assert_eq!(HookEvent::PreToolUse.to_string(), "pre_tool_use");
        assert_eq!(
            serde_json::to_string(&HookEvent::PreToolUse).unwrap(),
            "\"pre_tool_use\""
        );
    }
}
