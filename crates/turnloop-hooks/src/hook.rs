//! Hook definitions (spec §4.4 C4).
//!
//! Grounded in the teacher's `astrid-hooks::hook` module; narrowed to the
//! command handler only (the spec's HTTP/WASM/Agent handlers are not part
//! of this engine's surface).

use serde::{Deserialize, Serialize};
use turnloop_core::HookEvent;

/// What to do when a hook times out or exits non-zero (spec §4.4
/// "failure_behaviour").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureBehaviour {
    /// Log a warning and proceed as if the hook had returned `continue`.
    #[default]
    Ignore,
    /// Treat the failure as a `deny` verdict.
    Deny,
    /// Treat the failure as an `ask` verdict.
    Ask,
}

fn default_timeout_secs() -> u64 {
    30
}

/// One user-configured hook (spec §4.4: "{type: command, command: string,
/// timeout?: seconds}").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookDefinition {
    /// The lifecycle moment this hook runs at.
    pub event: HookEvent,
    /// The shell command to execute.
    pub command: String,
    /// Seconds to wait before killing the hook process.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Behaviour on timeout or non-zero exit.
    #[serde(default)]
    pub failure_behaviour: FailureBehaviour,
    /// Optional glob restricting which tool names this hook runs for
    /// (only meaningful for `PreToolUse`/`PostToolUse`/`PostToolUseFailure`).
    #[serde(default)]
    pub matcher: Option<String>,
}

impl HookDefinition {
    /// Build a minimal hook definition for the given event and command.
    #[must_use]
    pub fn new(event: HookEvent, command: impl Into<String>) -> Self {
        Self {
            event,
            command: command.into(),
            timeout_secs: default_timeout_secs(),
            failure_behaviour: FailureBehaviour::default(),
            matcher: None,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the failure behaviour.
    #[must_use]
    pub fn with_failure_behaviour(mut self, behaviour: FailureBehaviour) -> Self {
        self.failure_behaviour = behaviour;
        self
    }

    /// Restrict this hook to tool names matching `pattern`.
    #[must_use]
    pub fn with_matcher(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = Some(pattern.into());
        self
    }

    /// Whether this hook should run for the given tool name, per its
    /// optional matcher.
    #[must_use]
    pub fn matches_tool(&self, tool_name: &str) -> bool {
        match &self.matcher {
            None => true,
            Some(pattern) => globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(tool_name))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_none_matches_everything() {
        let hook = HookDefinition::new(HookEvent::PreToolUse, "echo hi");
        assert!(hook.matches_tool("Bash"));
    }

    #[test]
    fn matcher_glob_restricts_tool_name() {
        let hook = HookDefinition::new(HookEvent::PreToolUse, "echo hi").with_matcher("Bash*");
        assert!(hook.matches_tool("Bash"));
        assert!(!hook.matches_tool("Read"));
    }
}
