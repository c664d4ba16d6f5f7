//! Convenience re-exports. `use turnloop_hooks::prelude::*;`

pub use crate::{
    DiscoveryError, DispatchOutcome, DispatchVerdict, FailureBehaviour, HookDecision,
    HookDefinition, HookDispatcher, HookExecution, HookOutput, HookPayload, HookRunOutcome,
    HooksConfig,
};
