//! Read file tool — reads a file with line numbers (cat -n style).

use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::Value;
use turnloop_permission::ToolKind;

use super::{format_permission_pattern, generalize_file_path};
use crate::context::ToolContext;
use crate::error::{ToolError, ToolResult};
use crate::tool::Tool;

/// Default maximum lines to read.
const DEFAULT_LINE_LIMIT: usize = 2000;
/// Maximum line length before truncation.
const MAX_LINE_LENGTH: usize = 2000;

/// Built-in tool for reading files.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file from the filesystem. Returns contents with line numbers (cat -n format). \
         Default reads up to 2000 lines. Use offset and limit for large files. \
         Lines longer than 2000 characters are truncated."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::ReadOnly
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based). Only provide for large files."
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of lines to read. Only provide for large files."
                }
            },
            "required": ["file_path"]
        })
    }

    fn permission_rule_abstractor(&self, args: &Value) -> String {
        let file_path = args.get("file_path").and_then(Value::as_str).unwrap_or("");
        let generalized = generalize_file_path(file_path);
        format_permission_pattern("read_file", &[("file_path", &generalized)])
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        let file_path = args
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("file_path is required".into()))?;

        let offset = args
            .get("offset")
            .and_then(Value::as_u64)
            .map(|v| usize::try_from(v).unwrap_or(usize::MAX));

        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |v| usize::try_from(v).unwrap_or(usize::MAX));

        let path = std::path::Path::new(file_path);
        if !path.exists() {
            return Err(ToolError::PathNotFound(file_path.to_string()));
        }

        let raw = tokio::fs::read(path).await?;
        let check_len = raw.len().min(8192);
        if raw[..check_len].contains(&0) {
            return Err(ToolError::ExecutionFailed(format!("{file_path} appears to be a binary file")));
        }

        let content = String::from_utf8(raw)
            .map_err(|_| ToolError::ExecutionFailed(format!("{file_path} is not valid UTF-8")))?;

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let start = offset.map_or(0, |o| o.saturating_sub(1));
        let end = start.saturating_add(limit).min(total_lines);

        if start >= total_lines {
            ctx.access_tracker.record_read(path, ctx.session_id.clone())?;
            return Ok(format!("(file has {total_lines} lines, offset {start} is past end)"));
        }

        let mut output = String::new();
        for (idx, &line) in lines[start..end].iter().enumerate() {
            #[allow(clippy::arithmetic_side_effects)]
            let line_num = start + idx + 1;
            let display_line = if line.len() > MAX_LINE_LENGTH { &line[..MAX_LINE_LENGTH] } else { line };
            let _ = writeln!(output, "{line_num:>6}\t{display_line}");
        }

        if end < total_lines {
            let _ = write!(
                output,
                "\n(showing lines {}-{} of {total_lines}; use offset/limit for more)",
                start.saturating_add(1),
                end
            );
        }

        ctx.access_tracker.record_read(path, ctx.session_id.clone())?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_tracker::FileAccessTracker;
    use std::io::Write as IoWrite;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use turnloop_core::SessionId;

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), SessionId::from_existing("s1"), Arc::new(FileAccessTracker::new()))
    }

    #[tokio::test]
    async fn reads_file_with_line_numbers() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line one").unwrap();
        writeln!(f, "line two").unwrap();

        let result = ReadFileTool
            .invoke(serde_json::json!({"file_path": f.path().to_str().unwrap()}), &ctx())
            .await
            .unwrap();

        assert!(result.contains("line one"));
        assert!(result.contains("     1\t"));
    }

    #[tokio::test]
    async fn missing_file_is_path_not_found() {
        let result = ReadFileTool
            .invoke(serde_json::json!({"file_path": "/tmp/turnloop_nonexistent_12345.txt"}), &ctx())
            .await;
        assert!(matches!(result.unwrap_err(), ToolError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn offset_and_limit_restrict_the_window() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 1..=20 {
            writeln!(f, "line {i}").unwrap();
        }

        let result = ReadFileTool
            .invoke(
                serde_json::json!({"file_path": f.path().to_str().unwrap(), "offset": 5, "limit": 3}),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(result.contains("line 5"));
        assert!(result.contains("line 7"));
        assert!(!result.contains("line 8"));
    }

    #[tokio::test]
    async fn binary_file_is_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&[0x00, 0x01, 0x02, 0xFF]).unwrap();

        let result = ReadFileTool
            .invoke(serde_json::json!({"file_path": f.path().to_str().unwrap()}), &ctx())
            .await;

        assert!(result.unwrap_err().to_string().contains("binary file"));
    }

    #[tokio::test]
    async fn successful_read_records_access() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "hello").unwrap();
        let ctx = ctx();

        ReadFileTool
            .invoke(serde_json::json!({"file_path": f.path().to_str().unwrap()}), &ctx)
            .await
            .unwrap();

        assert!(ctx.access_tracker.check_before_write(f.path(), &ctx.session_id).is_ok());
    }

    #[test]
    fn abstractor_generalizes_to_the_extension_family() {
        let pattern = ReadFileTool.permission_rule_abstractor(&serde_json::json!({"file_path": "src/a.rs"}));
        assert_eq!(pattern, "read_file(file_path:**/*.rs)");
    }
}
