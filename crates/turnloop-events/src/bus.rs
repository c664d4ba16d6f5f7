//! The event bus (spec §4.8 C8): ordered delivery with chunk coalescing
//! under backpressure.
//!
//! Grounded in the teacher's `astrid-events::bus` broadcast-channel design;
//! extended with a per-stream coalescing stage in front of the broadcast
//! send so a slow subscriber degrades to latest-wins chunk delivery instead
//! of blocking the turn (spec §4.8, §5 scheduling model).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::{AgentEvent, ChunkStreamKey};
use crate::subscriber::SubscriberRegistry;

/// Default broadcast channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default high-water mark: once the channel holds this many unread events,
/// subsequent chunk events are coalesced rather than enqueued.
pub const DEFAULT_HIGH_WATER_MARK: usize = 256;

/// Publishes a typed, ordered event stream to any number of subscribers.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
    registry: SubscriberRegistry,
    capacity: usize,
    high_water_mark: usize,
    pending_chunks: Mutex<HashMap<ChunkStreamKey, Arc<AgentEvent>>>,
}

impl EventBus {
    /// Create a bus with default capacity and high-water mark.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_HIGH_WATER_MARK)
    }

    /// Create a bus with explicit capacity and high-water mark.
    #[must_use]
    pub fn with_capacity(capacity: usize, high_water_mark: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: SubscriberRegistry::new(),
            capacity,
            high_water_mark,
            pending_chunks: Mutex::new(HashMap::new()),
        }
    }

    /// Publish an event.
    ///
    /// Chunk events (`assistant_text_chunk`, `assistant_thinking_chunk`)
    /// are coalesced latest-wins per `(turn_id, stream kind)` once the
    /// channel's backlog crosses `high_water_mark`; all other events are
    /// always enqueued (spec §4.8).
    ///
    /// Returns the number of subscribers the event (or its coalesced
    /// predecessor) was ultimately delivered to.
    pub fn publish(&self, event: AgentEvent) -> usize {
        self.registry.notify(&event);

        if let Some(key) = event.chunk_stream_key() {
            if self.sender.len() >= self.high_water_mark {
                let event_type = event.event_type();
                self.pending_chunks
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(key, Arc::new(event));
                warn!(event_type, turn_id = key.turn_id, "coalescing chunk event under backpressure");
                return 0;
            }
            self.flush_pending(key);
        }

        let event = Arc::new(event);
        trace!(event_type = event.event_type(), "publishing event");
        match self.sender.send(Arc::clone(&event)) {
            Ok(count) => {
                debug!(event_type = event.event_type(), receiver_count = count, "event published");
                count
            },
            Err(_) => 0,
        }
    }

    /// Flush any coalesced chunk pending for `key`, e.g. when a turn ends
    /// and no further chunk of that stream will arrive to trigger a flush
    /// naturally.
    pub fn flush_pending(&self, key: ChunkStreamKey) {
        let pending = self
            .pending_chunks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&key);
        if let Some(event) = pending {
            let _ = self.sender.send(event);
        }
    }

    /// Flush every coalesced chunk still pending for `turn_id` (called when
    /// a turn ends, spec §5 "turn N's `turn_ended` is emitted... before
    /// turn N+1's `turn_started`").
    pub fn flush_turn(&self, turn_id: u64) {
        let keys: Vec<ChunkStreamKey> = self
            .pending_chunks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .filter(|k| k.turn_id == turn_id)
            .copied()
            .collect();
        for key in keys {
            self.flush_pending(key);
        }
    }

    /// Subscribe to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The synchronous subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Current number of active async subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The configured coalescing high-water mark.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            registry: SubscriberRegistry::new(),
            capacity: self.capacity,
            high_water_mark: self.high_water_mark,
            pending_chunks: Mutex::new(HashMap::new()),
        }
    }
}

/// An async subscription to the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<AgentEvent>>,
}

impl EventReceiver {
    /// Receive the next event, transparently skipping past lag.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use turnloop_core::SessionId;

    fn text_chunk(turn_id: u64, text: &str) -> AgentEvent {
        AgentEvent::AssistantTextChunk {
            metadata: EventMetadata::new("test"),
            turn_id,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_and_receive_round_trips() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let count = bus.publish(AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 1,
        });
        assert_eq!(count, 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "turn_started");
    }

    #[tokio::test]
    async fn non_chunk_events_are_never_coalesced() {
        let bus = EventBus::with_capacity(16, 0);
        let mut rx = bus.subscribe();
        bus.publish(AgentEvent::TurnStarted {
            metadata: EventMetadata::new("test"),
            session_id: SessionId::from_existing("s1"),
            turn_id: 1,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "turn_started");
    }

    #[tokio::test]
    async fn chunk_events_coalesce_latest_wins_under_backpressure() {
        // High-water mark of 0 forces every chunk publish to coalesce.
        let bus = EventBus::with_capacity(16, 0);
        let mut rx = bus.subscribe();

        bus.publish(text_chunk(1, "a"));
        bus.publish(text_chunk(1, "b"));
        bus.publish(text_chunk(1, "c"));
        assert!(rx.try_recv().is_none(), "coalesced chunks must not be enqueued yet");

        bus.flush_turn(1);

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            AgentEvent::AssistantTextChunk { text, .. } => assert_eq!(text, "c"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_none(), "only the latest coalesced chunk is delivered");
    }

    #[tokio::test]
    async fn subscriber_count_tracks_active_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx1);
    }
}
