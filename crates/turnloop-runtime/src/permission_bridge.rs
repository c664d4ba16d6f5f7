//! Bridges [`turnloop_permission::PermissionPrompt`] to the event bus (spec
//! §4.8 `permission_request`: "synchronous: carries a response channel with
//! a timeout").
//!
//! Grounded in the teacher's `astrid-approval::bridge`: the permission
//! engine never knows about the transport, it just awaits a trait object;
//! here that trait object turns around and publishes on C8, then blocks on
//! a oneshot reply that the front-end fulfills via [`EventBusPrompt::respond`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use turnloop_events::{AgentEvent, EventBus, EventMetadata, PermissionOutcome, PermissionRequestPayload};
use turnloop_permission::{PermissionPrompt, PromptResponse, ToolCallRequest};

/// How long a published `permission_request` waits for a front-end reply
/// before the bridge itself gives up (spec §6.4 default timeout).
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Implements [`PermissionPrompt`] by publishing a `permission_request`
/// event and waiting for [`Self::respond`] to be called with the matching
/// request id.
pub struct EventBusPrompt {
    bus: std::sync::Arc<EventBus>,
    turn_id: std::sync::atomic::AtomicU64,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<PermissionOutcome>>>,
}

impl EventBusPrompt {
    /// Build a bridge publishing onto `bus`.
    #[must_use]
    pub fn new(bus: std::sync::Arc<EventBus>) -> Self {
        Self {
            bus,
            turn_id: std::sync::atomic::AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Update which turn subsequent prompts should be attributed to.
    pub fn set_current_turn(&self, turn_id: u64) {
        self.turn_id.store(turn_id, std::sync::atomic::Ordering::Relaxed);
    }

    /// Deliver the front-end's answer for a previously published
    /// `permission_request`. A reply for an unknown or already-answered
    /// request id is silently ignored (the prompt has already timed out).
    pub fn respond(&self, request_id: Uuid, outcome: PermissionOutcome) {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&request_id);
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }
}

#[async_trait]
impl PermissionPrompt for EventBusPrompt {
    async fn prompt(&self, request: &ToolCallRequest) -> Option<PromptResponse> {
        let metadata = EventMetadata::new("permission_bridge");
        let request_id = metadata.id;
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(request_id, tx);

        let turn_id = self.turn_id.load(std::sync::atomic::Ordering::Relaxed);
        self.bus.publish(AgentEvent::PermissionRequest {
            metadata,
            turn_id,
            request: PermissionRequestPayload {
                tool_name: request.tool_name.clone(),
                candidate_pattern: request.canonical_pattern.clone(),
                description: format!("{} {}", request.tool_name, request.raw_arguments),
                timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            },
        });

        match tokio::time::timeout(DEFAULT_RESPONSE_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => Some(outcome_to_response(outcome)),
            Ok(Err(_)) | Err(_) => {
                self.pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&request_id);
                None
            },
        }
    }
}

fn outcome_to_response(outcome: PermissionOutcome) -> PromptResponse {
    match outcome {
        PermissionOutcome::AllowOnce => PromptResponse::AllowOnce,
        PermissionOutcome::AllowAlways => PromptResponse::AllowAlways,
        PermissionOutcome::Deny => PromptResponse::RejectOnce,
        // The bridge's own `tokio::time::timeout` already maps a timeout to
        // `None` before this conversion runs; reachable only if a caller
        // fabricates this outcome directly, in which case `reject_once` is
        // the safe reading.
        PermissionOutcome::TimedOut => PromptResponse::RejectOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnloop_permission::ToolKind;

    #[tokio::test]
    async fn respond_resolves_the_pending_prompt() {
        let bus = std::sync::Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let bridge = std::sync::Arc::new(EventBusPrompt::new(bus));

        let bridge_clone = bridge.clone();
        let handle = tokio::spawn(async move {
            let request = ToolCallRequest::new("Bash", ToolKind::Execute, "Bash(command:ls)", json!({}));
            bridge_clone.prompt(&request).await
        });

        let event = rx.recv().await.unwrap();
        let request_id = match event.as_ref() {
            AgentEvent::PermissionRequest { metadata, .. } => metadata.id,
            other => panic!("unexpected event: {other:?}"),
        };

        bridge.respond(request_id, PermissionOutcome::AllowOnce);
        let response = handle.await.unwrap();
        assert_eq!(response, Some(PromptResponse::AllowOnce));
    }

    #[tokio::test]
    async fn unanswered_prompt_times_out_as_none() {
        let bus = std::sync::Arc::new(EventBus::new());
        let _rx = bus.subscribe();
        let bridge = EventBusPrompt::new(bus);
        // This test only exercises the bookkeeping path, not the full
        // 5-minute timeout; respond() on a never-requested id is a no-op.
        bridge.respond(Uuid::new_v4(), PermissionOutcome::Deny);
    }
}
