//! The `Tool` trait every built-in and MCP-discovered tool implements
//! (spec §6.2).

use async_trait::async_trait;
use serde_json::Value;

use turnloop_permission::ToolKind;

use crate::context::ToolContext;
use crate::error::ToolResult;

/// A tool the agent loop can call: native (registered at startup) or
/// discovered dynamically via an external bridge and namespaced
/// `mcp__<server>__<tool>` (spec §4.5).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, as the LLM sees it.
    fn name(&self) -> &str;

    /// Human-readable description shown to the LLM.
    fn description(&self) -> &str;

    /// What kind of action this tool performs, for C3 permission checks.
    fn kind(&self) -> ToolKind;

    /// JSON-Schema for the tool's arguments.
    fn input_schema(&self) -> Value;

    /// Whether multiple invocations of this tool may run concurrently
    /// within a session (spec §4.5 step 4). Read-only tools default to
    /// safe; everything else defaults to unsafe.
    fn concurrency_safe(&self) -> bool {
        matches!(self.kind(), ToolKind::ReadOnly)
    }

    /// Produce the canonical permission-rule pattern for this call (spec
    /// §6.5), e.g. `Bash(command:ls *)`.
    fn permission_rule_abstractor(&self, args: &Value) -> String;

    /// Execute the tool.
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult;
}
