//! Edit file tool — performs exact string replacements in files, subject
//! to the read-before-write discipline (spec §4.5).

use async_trait::async_trait;
use serde_json::Value;
use turnloop_permission::ToolKind;

use super::{format_permission_pattern, generalize_file_path};
use crate::context::ToolContext;
use crate::error::{ToolError, ToolResult};
use crate::tool::Tool;

/// Built-in tool for editing files via string replacement.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Performs exact string replacements in files. The old_string must be unique in the file \
         unless replace_all is true. Fails if old_string is not found or matches multiple times \
         (without replace_all). The file must have been read earlier in this session first."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)",
                    "default": false
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    fn permission_rule_abstractor(&self, args: &Value) -> String {
        let file_path = args.get("file_path").and_then(Value::as_str).unwrap_or("");
        let generalized = generalize_file_path(file_path);
        format_permission_pattern("edit_file", &[("file_path", &generalized)])
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = args
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("file_path is required".into()))?;

        let old_string = args
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("old_string is required".into()))?;

        let new_string = args
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("new_string is required".into()))?;

        let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        let path = std::path::Path::new(file_path);
        if !path.exists() {
            return Err(ToolError::PathNotFound(file_path.to_string()));
        }

        ctx.access_tracker.check_before_write(path, &ctx.session_id)?;

        let content = tokio::fs::read_to_string(path).await?;
        let count = content.matches(old_string).count();

        if count == 0 {
            return Err(ToolError::ExecutionFailed(format!("old_string not found in {file_path}")));
        }

        if count > 1 && !replace_all {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string found {count} times in {file_path} — use replace_all or provide more context to make it unique"
            )));
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        tokio::fs::write(path, &new_content).await?;
        ctx.access_tracker.record_read(path, ctx.session_id.clone())?;

        if replace_all && count > 1 {
            Ok(format!("Replaced {count} occurrences in {file_path}"))
        } else {
            Ok(format!("Edited {file_path}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_tracker::FileAccessTracker;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use turnloop_core::SessionId;

    fn ctx_read(path: &std::path::Path) -> ToolContext {
        let ctx = ToolContext::new(std::env::temp_dir(), SessionId::from_existing("s1"), Arc::new(FileAccessTracker::new()));
        ctx.access_tracker.record_read(path, ctx.session_id.clone()).unwrap();
        ctx
    }

    #[tokio::test]
    async fn replaces_a_unique_match() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();
        let ctx = ctx_read(f.path());

        let result = EditFileTool
            .invoke(
                serde_json::json!({"file_path": f.path().to_str().unwrap(), "old_string": "hello", "new_string": "goodbye"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(result.contains("Edited"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "goodbye world");
    }

    #[tokio::test]
    async fn requires_prior_read() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();
        let ctx = ToolContext::new(std::env::temp_dir(), SessionId::from_existing("s1"), Arc::new(FileAccessTracker::new()));

        let result = EditFileTool
            .invoke(
                serde_json::json!({"file_path": f.path().to_str().unwrap(), "old_string": "hello", "new_string": "goodbye"}),
                &ctx,
            )
            .await;

        assert!(matches!(result.unwrap_err(), ToolError::RequiresRead(_)));
    }

    #[tokio::test]
    async fn old_string_not_found_fails() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();
        let ctx = ctx_read(f.path());

        let result = EditFileTool
            .invoke(
                serde_json::json!({"file_path": f.path().to_str().unwrap(), "old_string": "foobar", "new_string": "baz"}),
                &ctx,
            )
            .await;

        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn non_unique_match_fails_without_replace_all() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "aaa bbb aaa").unwrap();
        let ctx = ctx_read(f.path());

        let result = EditFileTool
            .invoke(
                serde_json::json!({"file_path": f.path().to_str().unwrap(), "old_string": "aaa", "new_string": "ccc"}),
                &ctx,
            )
            .await;

        assert!(result.unwrap_err().to_string().contains("2 times"));
    }

    #[tokio::test]
    async fn replace_all_replaces_every_occurrence() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "aaa bbb aaa").unwrap();
        let ctx = ctx_read(f.path());

        let result = EditFileTool
            .invoke(
                serde_json::json!({
                    "file_path": f.path().to_str().unwrap(),
                    "old_string": "aaa",
                    "new_string": "ccc",
                    "replace_all": true
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert!(result.contains("2 occurrences"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "ccc bbb ccc");
    }

    #[test]
    fn abstractor_generalizes_to_the_extension_family() {
        let pattern = EditFileTool.permission_rule_abstractor(&serde_json::json!({"file_path": "src/a.rs"}));
        assert_eq!(pattern, "edit_file(file_path:**/*.rs)");
    }
}
