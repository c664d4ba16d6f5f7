//! Convenience re-exports for downstream `turnloop-*` crates, matching the
//! teacher's per-crate `prelude` convention.

pub use crate::error::{EngineError, EngineResult, ErrorKind, UserFacingError};
pub use crate::event::{CompactMetadata, CompactTrigger, Event, EventKind};
pub use crate::hook_event::HookEvent;
pub use crate::ids::SessionId;
pub use crate::log::{EventDraft, LogStats, SessionLogStore};
pub use crate::workspace::{escape_workspace_path, session_dir, session_log_path, unescape_workspace_path};
