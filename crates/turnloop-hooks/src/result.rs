//! The structured output schema hooks emit on stdout, and the per-run
//! execution record (spec §4.4).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

/// A definitive permission verdict a hook may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookDecision {
    /// Deny the action outright.
    Deny,
    /// Ask the user before proceeding.
    Ask,
}

/// The structured block a hook emits on stdout (spec §4.4: "a structured
/// output block parsed from stdout per a documented schema").
///
/// Every field is optional/defaulted so a hook that prints nothing
/// parseable is treated as a silent `continue`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookOutput {
    /// `deny` or `ask`, for `PreToolUse` hooks. Absent means allow.
    #[serde(default)]
    pub decision: Option<HookDecision>,
    /// Why `decision` (or a `Stop`/`Compaction` block) was returned.
    #[serde(default)]
    pub reason: Option<String>,
    /// For `PreToolUse`: a partial patch merged left-to-right into the
    /// tool's arguments.
    #[serde(default)]
    pub updated_input: Option<serde_json::Value>,
    /// For sites that accumulate context (`PostToolUse`,
    /// `UserPromptSubmit`, `SessionStart`, ...): text appended to the
    /// prompt/transcript.
    #[serde(default)]
    pub additional_context: Option<String>,
    /// For `Stop`/`SubagentStop`: `false` blocks termination.
    #[serde(default = "default_true")]
    pub r#continue: bool,
    /// For `Compaction`: aborts compaction when `true`.
    #[serde(default)]
    pub block_compaction: bool,
    /// For `Notification`: suppresses the outgoing message when `true`.
    #[serde(default)]
    pub suppress: bool,
    /// For `Notification`: replaces the outgoing message text.
    #[serde(default)]
    pub rewritten_message: Option<String>,
    /// Extra environment variables a `SessionStart`/`UserPromptSubmit` hook
    /// wants injected into the session.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

impl HookOutput {
    /// Parse a hook's stdout; a blank or unparseable body is a silent
    /// `continue` rather than an error (spec §4.4 failure handling applies
    /// only to timeout/non-zero exit, not to unparseable output).
    #[must_use]
    pub fn parse(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        serde_json::from_str(trimmed).unwrap_or_default()
    }
}

/// What actually happened when a hook subprocess ran.
#[derive(Debug, Clone)]
pub enum HookRunOutcome {
    /// The process exited zero and its stdout parsed (or was empty).
    Success {
        /// Parsed structured output.
        output: HookOutput,
        /// Raw stdout, for diagnostics/logging.
        stdout: String,
    },
    /// The process exited non-zero.
    NonZeroExit {
        /// Exit code, if known.
        code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
    /// The process did not exit within its timeout and was killed.
    TimedOut,
    /// The process could not even be spawned.
    SpawnFailed {
        /// The OS error.
        message: String,
    },
}

/// One hook's execution record, independent of how its outcome was
/// interpreted by the dispatch policy.
#[derive(Debug, Clone)]
pub struct HookExecution {
    /// Correlates this run with its dispatch batch.
    pub invocation_id: Uuid,
    /// The command that was run.
    pub command: String,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// The raw outcome.
    pub outcome: HookRunOutcome,
}

impl HookExecution {
    /// The parsed output, if the run succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&HookOutput> {
        match &self.outcome {
            HookRunOutcome::Success { output, .. } => Some(output),
            _ => None,
        }
    }
}
