//! The normalized invocation result (spec §4.5 step 6, §6.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// What the invoker hands back after calling a tool, normalized so the
/// agent loop never has to branch on tool-specific result shapes.
///
/// `llm_content` is what is appended to the conversation as the tool
/// message; `display_content` is what a front-end may render instead (e.g.
/// a diff); `metadata` can carry structured extras like file paths or an
/// edit's diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Front-end rendering content, if different from `llm_content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_content: Option<String>,
    /// Content appended to the conversation for the model to see.
    pub llm_content: String,
    /// Structured extras (diffs, file paths, a result `kind`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Error message, present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    /// A successful outcome with no metadata or distinct display content.
    #[must_use]
    pub fn success(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            success: true,
            display_content: None,
            llm_content: content,
            metadata: None,
            error: None,
        }
    }

    /// Attach metadata to an existing outcome.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach distinct display content to an existing outcome.
    #[must_use]
    pub fn with_display_content(mut self, display: impl Into<String>) -> Self {
        self.display_content = Some(display.into());
        self
    }

    /// An outcome for an unknown tool name (spec §4.5 step 1).
    #[must_use]
    pub fn unknown_tool(name: &str) -> Self {
        Self::failure(format!("unknown tool: {name}"))
    }

    /// An outcome for an argument-schema validation failure (spec §4.5
    /// step 2). `metadata.kind` is set to `validation_error`.
    #[must_use]
    pub fn validation_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            display_content: None,
            llm_content: message.clone(),
            metadata: Some(serde_json::json!({"kind": "validation_error"})),
            error: Some(message),
        }
    }

    /// An outcome for a cancelled invocation (spec §4.5 step 3).
    #[must_use]
    pub fn cancelled() -> Self {
        let message = "cancelled".to_string();
        Self {
            success: false,
            display_content: None,
            llm_content: message.clone(),
            metadata: Some(serde_json::json!({"kind": "cancelled"})),
            error: Some(message),
        }
    }

    /// A generic failure outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            display_content: None,
            llm_content: message.clone(),
            metadata: None,
            error: Some(message),
        }
    }

    /// Build a failure outcome from a tool-raised [`ToolError`].
    #[must_use]
    pub fn from_error(error: &ToolError) -> Self {
        match error {
            ToolError::RequiresRead(_) => {
                let mut outcome = Self::failure(error.to_string());
                outcome.metadata = Some(serde_json::json!({"requires_read": true}));
                outcome
            },
            ToolError::ExternalModification(_) => {
                let mut outcome = Self::failure(error.to_string());
                outcome.metadata = Some(serde_json::json!({"kind": "external_modification"}));
                outcome
            },
            ToolError::Cancelled => Self::cancelled(),
            other => Self::failure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_unsuccessful() {
        let outcome = ToolOutcome::unknown_tool("frobnicate");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("frobnicate"));
    }

    #[test]
    fn validation_error_carries_kind_metadata() {
        let outcome = ToolOutcome::validation_error("missing field: path");
        assert_eq!(outcome.metadata.unwrap()["kind"], "validation_error");
    }

    #[test]
    fn requires_read_sets_metadata_flag() {
        let outcome = ToolOutcome::from_error(&ToolError::RequiresRead("/a/b.rs".into()));
        assert_eq!(outcome.metadata.unwrap()["requires_read"], true);
    }
}
