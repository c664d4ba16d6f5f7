//! turnloop-permission — the Permission Engine (spec §4.3 C3).
//!
//! Decides, for a proposed tool call, one of {allow, deny, ask} by
//! walking mode short-circuit, session approval cache, configured rule
//! lists, `PreToolUse` hook veto, and finally a user prompt.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod engine;
pub mod mode;
pub mod prelude;
pub mod request;
pub mod rule;

pub use cache::ApprovalCache;
pub use engine::{Decision, PermissionEngine, DEFAULT_PROMPT_TIMEOUT};
pub use mode::{PermissionMode, ShortCircuit, ToolKind};
pub use request::{PermissionPrompt, PromptOutcome, PromptResponse, ToolCallRequest};
pub use rule::{PermissionRule, RuleMatch, RuleScope, RuleSet};
