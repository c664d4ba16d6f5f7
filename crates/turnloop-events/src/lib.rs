//! turnloop-events — the typed event bus from the agent loop to external
//! observers (spec §4.8 C8).
//!
//! Two ways to subscribe: [`EventBus::subscribe`] for an async
//! [`EventReceiver`], or [`EventBus::registry`] for synchronous, in-line
//! [`EventSubscriber`] callbacks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod prelude;

mod bus;
mod event;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_HIGH_WATER_MARK, EventBus, EventReceiver};
pub use event::{
    AgentEvent, ChunkStreamKey, ChunkStreamKind, EventMetadata, PermissionOutcome,
    PermissionRequestPayload,
};
pub use subscriber::{EventFilter, EventSubscriber, FilterSubscriber, SubscriberId, SubscriberRegistry};
