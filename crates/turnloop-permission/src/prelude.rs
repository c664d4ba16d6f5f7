//! Convenience re-exports. `use turnloop_permission::prelude::*;`

pub use crate::{
    ApprovalCache, Decision, PermissionEngine, PermissionMode, PermissionPrompt, PermissionRule,
    PromptOutcome, PromptResponse, RuleMatch, RuleScope, RuleSet, ShortCircuit, ToolCallRequest,
    ToolKind, DEFAULT_PROMPT_TIMEOUT,
};
