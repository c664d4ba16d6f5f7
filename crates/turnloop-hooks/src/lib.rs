//! turnloop-hooks — the Hook Dispatcher (spec §4.4 C4).
//!
//! Runs user-configured command hooks at lifecycle points and folds their
//! structured stdout output into a verdict the permission engine, agent
//! loop, and compaction service can act on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod discovery;
pub mod executor;
pub mod hook;
pub mod prelude;
pub mod result;

pub use discovery::{DiscoveryError, HooksConfig};
pub use executor::{DispatchOutcome, DispatchVerdict, HookDispatcher, HookPayload};
pub use hook::{FailureBehaviour, HookDefinition};
pub use result::{HookDecision, HookExecution, HookOutput, HookRunOutcome};
