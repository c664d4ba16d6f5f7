//! Write file tool — writes content to a file, creating parent
//! directories as needed, subject to the read-before-write discipline
//! (spec §4.5).

use async_trait::async_trait;
use serde_json::Value;
use turnloop_permission::ToolKind;

use super::{format_permission_pattern, generalize_file_path};
use crate::context::ToolContext;
use crate::error::{ToolError, ToolResult};
use crate::tool::Tool;

/// Built-in tool for writing files.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file. Creates parent directories if they don't exist. \
         Overwrites the file if it already exists. An existing file must have been \
         read earlier in this session first."
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
                    "description": "Absolute path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn permission_rule_abstractor(&self, args: &Value) -> String {
        let file_path = args.get("file_path").and_then(Value::as_str).unwrap_or("");
        let generalized = generalize_file_path(file_path);
        format_permission_pattern("write_file", &[("file_path", &generalized)])
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = args
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("file_path is required".into()))?;

        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("content is required".into()))?;

        let path = std::path::Path::new(file_path);
        if !path.is_absolute() {
            return Err(ToolError::InvalidArguments("file_path must be an absolute path".into()));
        }

        ctx.access_tracker.check_before_write(path, &ctx.session_id)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        ctx.access_tracker.record_read(path, ctx.session_id.clone())?;

        let bytes = content.len();
        Ok(format!("Wrote {bytes} bytes to {file_path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_tracker::FileAccessTracker;
    use std::sync::Arc;
    use tempfile::TempDir;
    use turnloop_core::SessionId;

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), SessionId::from_existing("s1"), Arc::new(FileAccessTracker::new()))
    }

    #[tokio::test]
    async fn writes_new_file_without_prior_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");

        let result = WriteFileTool
            .invoke(serde_json::json!({"file_path": path.to_str().unwrap(), "content": "hello world"}), &ctx())
            .await
            .unwrap();

        assert!(result.contains("11 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c").join("test.txt");

        WriteFileTool
            .invoke(serde_json::json!({"file_path": path.to_str().unwrap(), "content": "nested"}), &ctx())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn overwriting_existing_file_without_read_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "old content").unwrap();

        let result = WriteFileTool
            .invoke(serde_json::json!({"file_path": path.to_str().unwrap(), "content": "new content"}), &ctx())
            .await;

        assert!(matches!(result.unwrap_err(), ToolError::RequiresRead(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old content");
    }

    #[tokio::test]
    async fn overwriting_after_read_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "old content").unwrap();
        let ctx = ctx();
        ctx.access_tracker.record_read(&path, ctx.session_id.clone()).unwrap();

        WriteFileTool
            .invoke(serde_json::json!({"file_path": path.to_str().unwrap(), "content": "new content"}), &ctx)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new content");
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let result = WriteFileTool
            .invoke(serde_json::json!({"file_path": "relative/test.txt", "content": "hi"}), &ctx())
            .await;
        assert!(matches!(result.unwrap_err(), ToolError::InvalidArguments(_)));
    }

    #[test]
    fn abstractor_generalizes_to_the_extension_family() {
        let pattern = WriteFileTool.permission_rule_abstractor(&serde_json::json!({"file_path": "src/a.rs"}));
        assert_eq!(pattern, "write_file(file_path:**/*.rs)");
        let other = WriteFileTool.permission_rule_abstractor(&serde_json::json!({"file_path": "src/b.rs"}));
        assert_eq!(pattern, other);
    }
}
