//! The invocation pipeline (spec §4.5 steps 1-6).

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::context::ToolContext;
use crate::outcome::ToolOutcome;
use crate::registry::ToolRegistry;
use crate::truncate::truncate_output;

/// Drives one tool call through lookup, schema validation, cancellation,
/// concurrency control, execution, and result normalization.
///
/// One `Invoker` is shared by every tool call within a session; its
/// `non_safe_lock` is exactly the "per-session lock" spec §4.5 step 4
/// describes.
pub struct Invoker {
    registry: ToolRegistry,
    non_safe_lock: Mutex<()>,
}

impl Invoker {
    /// Build an invoker over `registry`.
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            non_safe_lock: Mutex::new(()),
        }
    }

    /// The underlying registry, for schema export and lookups outside the
    /// invocation path.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the full invocation pipeline for one tool call.
    pub async fn invoke(&self, tool_name: &str, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let Some(tool) = self.registry.get(tool_name) else {
            warn!(tool = tool_name, "unknown tool requested");
            return ToolOutcome::unknown_tool(tool_name);
        };

        if let Err(schema_error) = validate_schema(&tool.input_schema(), &args) {
            debug!(tool = tool_name, error = %schema_error, "tool argument validation failed");
            return ToolOutcome::validation_error(schema_error);
        }

        if ctx.is_cancelled() {
            return ToolOutcome::cancelled();
        }

        let _permit = if tool.concurrency_safe() {
            None
        } else {
            Some(self.non_safe_lock.lock().await)
        };

        debug!(tool = tool_name, "invoking tool");
        match tool.invoke(args, ctx).await {
            Ok(content) => ToolOutcome::success(truncate_output(content)),
            Err(error) => ToolOutcome::from_error(&error),
        }
    }
}

/// Validate `args` against `schema`, returning a human-readable error on
/// the first mismatch (spec §4.5 step 2).
fn validate_schema(schema: &Value, args: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| format!("invalid tool schema: {e}"))?;
    if let Err(error) = validator.validate(args) {
        return Err(error.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_tracker::FileAccessTracker;
    use std::sync::Arc;
    use turnloop_core::SessionId;

    fn ctx() -> ToolContext {
        ToolContext::new(
            std::env::temp_dir(),
            SessionId::from_existing("s1"),
            Arc::new(FileAccessTracker::new()),
        )
    }

    #[tokio::test]
    async fn unknown_tool_synthesizes_error_outcome() {
        let invoker = Invoker::new(ToolRegistry::with_defaults());
        let outcome = invoker.invoke("nonexistent_tool", serde_json::json!({}), &ctx()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn schema_validation_failure_is_synthesized_not_invoked() {
        let invoker = Invoker::new(ToolRegistry::with_defaults());
        // read_file requires file_path; omit it.
        let outcome = invoker.invoke("read_file", serde_json::json!({}), &ctx()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.metadata.unwrap()["kind"], "validation_error");
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let invoker = Invoker::new(ToolRegistry::with_defaults());
        let ctx = ctx();
        ctx.cancellation_token().cancel();
        let outcome = invoker
            .invoke("read_file", serde_json::json!({"file_path": "/tmp/x"}), &ctx)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.metadata.unwrap()["kind"], "cancelled");
    }

    #[tokio::test]
    async fn successful_invocation_normalizes_to_success_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "hello world").unwrap();

        let invoker = Invoker::new(ToolRegistry::with_defaults());
        let outcome = invoker
            .invoke("read_file", serde_json::json!({"file_path": path.to_str().unwrap()}), &ctx())
            .await;

        assert!(outcome.success);
        assert!(outcome.llm_content.contains("hello world"));
    }
}
