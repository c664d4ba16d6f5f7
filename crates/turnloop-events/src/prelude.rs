//! Convenience re-exports. `use turnloop_events::prelude::*;`

pub use crate::{
    AgentEvent, ChunkStreamKey, ChunkStreamKind, EventBus, EventFilter, EventMetadata,
    EventReceiver, EventSubscriber, FilterSubscriber, PermissionOutcome, PermissionRequestPayload,
    SubscriberId, SubscriberRegistry, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HIGH_WATER_MARK,
};
