//! turnloop-core — shared types, error taxonomy, and the durable session
//! log store for the turnloop agent execution engine.
//!
//! This crate has no knowledge of LLMs, tools, or permissions; it is the
//! foundation every other `turnloop-*` crate depends on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod hook_event;
pub mod ids;
pub mod log;
pub mod prelude;
pub mod workspace;

pub use error::{EngineError, EngineResult};
pub use event::{CompactMetadata, CompactTrigger, Event, EventKind};
pub use hook_event::HookEvent;
pub use ids::SessionId;
pub use log::SessionLogStore;
