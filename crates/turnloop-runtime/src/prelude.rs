//! Convenience re-exports. `use turnloop_runtime::prelude::*;`

pub use crate::{
    AgentLoop, AgentSession, CompactionResult, CompactionService, Conversation, EndReason,
    EventBusPrompt, RuntimeError, RuntimeResult, TokenUsage, TurnEndReason,
};
