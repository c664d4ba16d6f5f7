//! turnloop-runtime — conversation state (C2), context compaction (C6),
//! the agent loop (C7), and session lifecycle management (C9).
//!
//! This crate is where the other components come together: it drives
//! [`turnloop_llm::LlmProvider`] through [`agent_loop::AgentLoop`], asks
//! [`turnloop_permission::PermissionEngine`] before every tool call, and
//! persists everything through [`turnloop_core::log::SessionLogStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agent_loop;
pub mod compaction;
pub mod conversation;
pub mod error;
pub mod payload;
pub mod permission_bridge;
pub mod prelude;
pub mod session;

pub use agent_loop::{AgentLoop, TurnEndReason};
pub use compaction::{CompactionResult, CompactionService};
pub use conversation::{Conversation, TokenUsage};
pub use error::{RuntimeError, RuntimeResult};
pub use permission_bridge::EventBusPrompt;
pub use session::{AgentSession, EndReason};
