//! Synchronous subscriber registry, for observers that must react to an
//! event inline rather than polling an [`crate::EventReceiver`] (e.g. the
//! session log writer, spec §5 "log append order matches logical event
//! order").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::event::AgentEvent;

/// Identifies a registered synchronous subscriber, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Something that reacts to events inline, on the publisher's call stack.
pub trait EventSubscriber: Send + Sync {
    /// Called synchronously from [`crate::EventBus::publish`].
    fn on_event(&self, event: &AgentEvent);
}

/// Which events a [`FilterSubscriber`] forwards to its inner subscriber.
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Forward every event.
    All,
    /// Forward only events belonging to the given turn.
    Turn(u64),
    /// Forward only events whose `event_type()` is in this list.
    Kinds(Vec<&'static str>),
}

impl EventFilter {
    fn matches(&self, event: &AgentEvent) -> bool {
        match self {
            Self::All => true,
            Self::Turn(turn_id) => event_turn_id(event) == Some(*turn_id),
            Self::Kinds(kinds) => kinds.contains(&event.event_type()),
        }
    }
}

fn event_turn_id(event: &AgentEvent) -> Option<u64> {
    match event {
        AgentEvent::TurnStarted { turn_id, .. }
        | AgentEvent::AssistantTextChunk { turn_id, .. }
        | AgentEvent::AssistantThinkingChunk { turn_id, .. }
        | AgentEvent::ToolCallStart { turn_id, .. }
        | AgentEvent::ToolCallComplete { turn_id, .. }
        | AgentEvent::PermissionRequest { turn_id, .. }
        | AgentEvent::PlanUpdate { turn_id, .. }
        | AgentEvent::TurnEnded { turn_id, .. }
        | AgentEvent::TurnError { turn_id, .. } => Some(*turn_id),
        AgentEvent::CompactionStarted { .. } | AgentEvent::CompactionCompleted { .. } => None,
    }
}

/// Wraps an [`EventSubscriber`] so it only sees events matching `filter`.
pub struct FilterSubscriber<S: EventSubscriber> {
    filter: EventFilter,
    inner: S,
}

impl<S: EventSubscriber> FilterSubscriber<S> {
    /// Build a filtered view over `inner`.
    pub fn new(filter: EventFilter, inner: S) -> Self {
        Self { filter, inner }
    }
}

impl<S: EventSubscriber> EventSubscriber for FilterSubscriber<S> {
    fn on_event(&self, event: &AgentEvent) {
        if self.filter.matches(event) {
            self.inner.on_event(event);
        }
    }
}

/// A registry of synchronous subscribers, notified in registration order.
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn EventSubscriber>)>>,
}

impl SubscriberRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber, returning its id for later removal.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id, subscriber));
        id
    }

    /// Remove a previously registered subscriber.
    pub fn unregister(&self, id: SubscriberId) {
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    /// Notify every registered subscriber, in registration order.
    pub fn notify(&self, event: &AgentEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, subscriber) in subscribers.iter() {
            subscriber.on_event(event);
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the registry has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use std::sync::atomic::AtomicUsize;
    use turnloop_core::SessionId;

    struct CountingSubscriber(Arc<AtomicUsize>);
    impl EventSubscriber for CountingSubscriber {
        fn on_event(&self, _event: &AgentEvent) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn registered_subscriber_is_notified() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(CountingSubscriber(count.clone())));

        registry.notify(&AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 1,
        });

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unregistered_subscriber_stops_receiving() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = registry.register(Arc::new(CountingSubscriber(count.clone())));
        registry.unregister(id);

        registry.notify(&AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 1,
        });

        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn filter_subscriber_only_forwards_matching_turn() {
        let count = Arc::new(AtomicUsize::new(0));
        let filtered = FilterSubscriber::new(
            EventFilter::Turn(2),
            CountingSubscriber(count.clone()),
        );

        filtered.on_event(&AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 1,
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);

        filtered.on_event(&AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 2,
        });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
