//! The typed events published to [`crate::EventBus`] (spec §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnloop_core::SessionId;
use turnloop_core::error::{ErrorKind, UserFacingError};
use uuid::Uuid;

/// Metadata common to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique id for this published event (distinct from the log's `Event::id`).
    pub id: Uuid,
    /// When this event was published.
    pub timestamp: DateTime<Utc>,
    /// Which subsystem published it (e.g. `"agent_loop"`, `"compaction"`).
    pub source: String,
}

impl EventMetadata {
    /// Stamp a new metadata record for `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Which chunk stream an event belongs to, for coalescing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkStreamKind {
    /// `assistant_text_chunk`.
    Text,
    /// `assistant_thinking_chunk`.
    Thinking,
}

/// Key identifying one coalescable stream within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkStreamKey {
    /// The turn the chunk belongs to.
    pub turn_id: u64,
    /// Which chunk stream.
    pub kind: ChunkStreamKind,
}

/// The outcome of a synchronous permission prompt (spec §4.8
/// `permission_request`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionOutcome {
    /// Allow this one invocation.
    AllowOnce,
    /// Allow this and remember the decision for the session.
    AllowAlways,
    /// Deny this invocation.
    Deny,
    /// No response arrived before the timeout; treated as deny.
    TimedOut,
}

/// Everything a subscriber needs to answer a synchronous permission prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequestPayload {
    /// The tool name being requested.
    pub tool_name: String,
    /// The canonical rule pattern this call would match if allowed
    /// (e.g. `Bash(git commit:*)`).
    pub candidate_pattern: String,
    /// Human-readable description of what the tool is about to do.
    pub description: String,
    /// How long the caller will wait before treating this as denied.
    pub timeout_ms: u64,
}

/// The ordered, typed event stream published from the agent loop to
/// external observers (spec §4.8 C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A new turn has begun.
    TurnStarted {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Session the turn belongs to.
        session_id: SessionId,
        /// Turn sequence number within the session.
        turn_id: u64,
    },
    /// An incremental slice of the assistant's visible reply text.
    AssistantTextChunk {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this chunk belongs to.
        turn_id: u64,
        /// The text delta.
        text: String,
    },
    /// An incremental slice of the assistant's reasoning trace, if the
    /// provider exposes one.
    AssistantThinkingChunk {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this chunk belongs to.
        turn_id: u64,
        /// The reasoning delta.
        text: String,
    },
    /// A tool invocation has begun executing.
    ToolCallStart {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this call belongs to.
        turn_id: u64,
        /// The tool's registered name.
        tool_name: String,
        /// Id correlating this start with its matching completion.
        call_id: String,
    },
    /// A tool invocation has finished.
    ToolCallComplete {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this call belongs to.
        turn_id: u64,
        /// Id correlating this completion with its matching start.
        call_id: String,
        /// Whether the tool reported success.
        success: bool,
    },
    /// A synchronous request for a permission decision.
    PermissionRequest {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this request belongs to.
        turn_id: u64,
        /// The request itself.
        request: PermissionRequestPayload,
    },
    /// The assistant's to-do/plan state changed.
    PlanUpdate {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn this update belongs to.
        turn_id: u64,
        /// Opaque plan representation (rendered by the front-end).
        plan: serde_json::Value,
    },
    /// A turn finished normally.
    TurnEnded {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn that ended.
        turn_id: u64,
        /// Why it ended (`"end_of_turn"`, `"cancelled"`, `"step_budget"`).
        reason: String,
    },
    /// A turn finished with an error.
    TurnError {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Turn that errored.
        turn_id: u64,
        /// The user-facing rendering of the failure.
        error: UserFacingError,
    },
    /// Compaction has begun.
    CompactionStarted {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Session being compacted.
        session_id: SessionId,
    },
    /// Compaction has finished.
    CompactionCompleted {
        /// Event envelope metadata.
        metadata: EventMetadata,
        /// Session that was compacted.
        session_id: SessionId,
        /// Token count before compaction.
        pre_tokens: usize,
        /// Token count after compaction.
        post_tokens: usize,
    },
}

impl AgentEvent {
    /// The event's wire/log type name, matching the `serde` tag.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::AssistantTextChunk { .. } => "assistant_text_chunk",
            Self::AssistantThinkingChunk { .. } => "assistant_thinking_chunk",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallComplete { .. } => "tool_call_complete",
            Self::PermissionRequest { .. } => "permission_request",
            Self::PlanUpdate { .. } => "plan_update",
            Self::TurnEnded { .. } => "turn_ended",
            Self::TurnError { .. } => "turn_error",
            Self::CompactionStarted { .. } => "compaction_started",
            Self::CompactionCompleted { .. } => "compaction_completed",
        }
    }

    /// The event envelope's metadata, common to every variant.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::TurnStarted { metadata, .. }
            | Self::AssistantTextChunk { metadata, .. }
            | Self::AssistantThinkingChunk { metadata, .. }
            | Self::ToolCallStart { metadata, .. }
            | Self::ToolCallComplete { metadata, .. }
            | Self::PermissionRequest { metadata, .. }
            | Self::PlanUpdate { metadata, .. }
            | Self::TurnEnded { metadata, .. }
            | Self::TurnError { metadata, .. }
            | Self::CompactionStarted { metadata, .. }
            | Self::CompactionCompleted { metadata, .. } => metadata,
        }
    }

    /// The coalescing key for chunk events, or `None` for events that must
    /// never be dropped (spec §4.8 "Non-chunk events are never dropped").
    #[must_use]
    pub fn chunk_stream_key(&self) -> Option<ChunkStreamKey> {
        match self {
            Self::AssistantTextChunk { turn_id, .. } => Some(ChunkStreamKey {
                turn_id: *turn_id,
                kind: ChunkStreamKind::Text,
            }),
            Self::AssistantThinkingChunk { turn_id, .. } => Some(ChunkStreamKey {
                turn_id: *turn_id,
                kind: ChunkStreamKind::Thinking,
            }),
            _ => None,
        }
    }

    /// Build a `turn_error` event from an [`turnloop_core::EngineError`] kind
    /// and rendered message, for callers that already hold a
    /// [`UserFacingError`].
    #[must_use]
    pub fn turn_error(source: impl Into<String>, turn_id: u64, error: UserFacingError) -> Self {
        Self::TurnError {
            metadata: EventMetadata::new(source),
            turn_id,
            error,
        }
    }

    /// Whether this event's error kind is the given kind (test convenience).
    #[must_use]
    pub fn is_error_kind(&self, kind: ErrorKind) -> bool {
        matches!(self, Self::TurnError { error, .. } if error.kind == kind)
    }
}
