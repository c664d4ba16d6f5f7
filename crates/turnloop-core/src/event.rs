//! The durable [`Event`] record — the immutable unit written to the
//! session log (spec §3, §6.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Current schema version stamped onto every event this build writes.
///
/// Bump when the on-disk shape changes in a way readers need to branch on.
pub const SCHEMA_VERSION: &str = "1";

/// The kind of a logged event (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user-authored message.
    User,
    /// An assistant-authored message (text and/or tool calls).
    Assistant,
    /// An engine-authored system note (e.g. a fault description).
    System,
    /// A tool invocation requested by the assistant.
    ToolCall,
    /// The result of a tool invocation.
    ToolResult,
    /// Marks the boundary compaction truncated history at.
    CompactBoundary,
    /// The summary produced by compaction, replacing truncated history.
    CompactSummary,
}

/// Why compaction ran (spec §3 `compact_metadata.trigger`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactTrigger {
    /// Triggered automatically by token-budget accounting.
    Auto,
    /// Triggered by an explicit user command.
    Manual,
}

/// Metadata attached to compaction boundary/summary events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactMetadata {
    /// What triggered this compaction.
    pub trigger: CompactTrigger,
    /// Input token count immediately before compaction.
    pub pre_tokens: usize,
    /// Input token count immediately after compaction, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_tokens: Option<usize>,
    /// Paths of files read into the summarization prompt.
    #[serde(default)]
    pub files_included: Vec<String>,
}

/// One immutable, durable log record (spec §3 "Event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique, monotonically assigned within the file.
    pub id: u64,
    /// Previous event in the logical thread, or `None` for the first event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    /// Set across compaction boundaries so lineage survives truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_parent_id: Option<u64>,
    /// The session this event belongs to.
    pub session_id: SessionId,
    /// UTC timestamp, ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// Schema version this event was written under.
    pub schema_version: String,
    /// Absolute workspace root the session is bound to.
    pub workspace_root: String,
    /// VCS branch active at write time, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcs_branch: Option<String>,
    /// What kind of event this is.
    pub kind: EventKind,
    /// Optional refinement of `kind` (e.g. `"compact_boundary"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subkind: Option<String>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
    /// Present on compaction boundary/summary events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_metadata: Option<CompactMetadata>,
}

impl Event {
    /// Build the next event in a session, inheriting `parent_id` from the
    /// caller-supplied previous event id.
    #[must_use]
    pub fn new(
        id: u64,
        parent_id: Option<u64>,
        session_id: SessionId,
        workspace_root: impl Into<String>,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            parent_id,
            logical_parent_id: None,
            session_id,
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION.to_string(),
            workspace_root: workspace_root.into(),
            vcs_branch: None,
            kind,
            subkind: None,
            payload,
            compact_metadata: None,
        }
    }

    /// Attach a VCS branch.
    #[must_use]
    pub fn with_vcs_branch(mut self, branch: impl Into<String>) -> Self {
        self.vcs_branch = Some(branch.into());
        self
    }

    /// Attach a subkind.
    #[must_use]
    pub fn with_subkind(mut self, subkind: impl Into<String>) -> Self {
        self.subkind = Some(subkind.into());
        self
    }

    /// Attach a logical parent (used across compaction boundaries).
    #[must_use]
    pub fn with_logical_parent(mut self, logical_parent_id: u64) -> Self {
        self.logical_parent_id = Some(logical_parent_id);
        self
    }

    /// Attach compaction metadata.
    #[must_use]
    pub fn with_compact_metadata(mut self, metadata: CompactMetadata) -> Self {
        self.compact_metadata = Some(metadata);
        self
    }

    /// Serialize this event as one JSONL line, newline-terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized (should not
    /// happen for well-formed payloads).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let event = Event::new(
            1,
            None,
            SessionId::from_existing("s1"),
            "/workspace",
            EventKind::User,
            serde_json::json!({"text": "hello"}),
        );
        let line = event.to_line().unwrap();
        assert!(line.ends_with('\n'));
        let parsed: Event = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed.id, event.id);
        assert_eq!(parsed.kind, EventKind::User);
        assert_eq!(parsed.session_id, event.session_id);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let event = Event::new(
            1,
            None,
            SessionId::from_existing("s1"),
            "/workspace",
            EventKind::User,
            serde_json::json!({}),
        );
        let line = event.to_line().unwrap();
        assert!(!line.contains("parent_id"));
        assert!(!line.contains("vcs_branch"));
        assert!(!line.contains("compact_metadata"));
    }
}
