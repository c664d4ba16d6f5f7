//! Conversation State (spec §4.2 C2): the derived message sequence plus
//! token accounting, rebuilt from the Session Log Store on resume.
//!
//! Grounded in the teacher's `astrid-runtime::session::AgentSession`
//! message list and token estimator, reshaped around events rather than
//! being the primary store itself (here C1 is the source of truth, per
//! spec §3: "Conversation is rebuilt from it on resume").

use turnloop_core::{CompactTrigger, Event, EventKind};
use turnloop_llm::{Message, MessageRole, ToolCall, ToolCallResult};

use crate::payload::{
    AssistantPayload, CompactSummaryPayload, SystemPayload, ToolCallPayload, ToolResultPayload,
    UserPayload,
};

/// Token accounting for a Conversation (spec §3 "TokenUsage
/// {input, output, cumulative, window_max}").
#[derive(Debug, Clone, Copy)]
pub struct TokenUsage {
    /// Tokens in the most recent request's input.
    pub input_tokens: usize,
    /// Tokens generated in the most recent response.
    pub output_tokens: usize,
    /// Cumulative tokens across the whole session, if the provider reports it.
    pub cumulative_tokens: Option<usize>,
    /// The active model's context window size.
    pub window_max: usize,
}

impl TokenUsage {
    /// Start accounting against a context window of `window_max` tokens.
    #[must_use]
    pub fn new(window_max: usize) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            cumulative_tokens: None,
            window_max: window_max.max(1),
        }
    }

    /// Fraction of the context window currently occupied by input tokens
    /// (spec §4.6: "`conversation.token_usage.input / window_max > 0.8`").
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.input_tokens as f64 / self.window_max as f64
    }

    /// Apply a `usage` delta reported mid-stream (spec §6.3 `usage(input,
    /// output, cumulative)`).
    pub fn update(&mut self, input_tokens: usize, output_tokens: usize, cumulative_tokens: Option<usize>) {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        if cumulative_tokens.is_some() {
            self.cumulative_tokens = cumulative_tokens;
        }
    }

    /// Estimated USD cost of the current input/output token counts, at
    /// hardcoded Claude-era per-token rates (a convenience for display, not
    /// a billing system — see DESIGN.md).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimated_cost_usd(&self) -> f64 {
        const INPUT_RATE_PER_1K: f64 = 0.003;
        const OUTPUT_RATE_PER_1K: f64 = 0.015;
        let input_cost = (self.input_tokens as f64 / 1000.0) * INPUT_RATE_PER_1K;
        let output_cost = (self.output_tokens as f64 / 1000.0) * OUTPUT_RATE_PER_1K;
        input_cost + output_cost
    }
}

/// The in-memory ordered message view derived from Events (spec §3
/// "Conversation", §4.2 C2).
///
/// Updates are pure in-memory and happen on the single turn thread; callers
/// needing a consistent view from another task should clone via
/// [`Conversation::snapshot`].
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    token_usage: TokenUsage,
}

impl Conversation {
    /// Start an empty conversation against a `window_max`-token context.
    #[must_use]
    pub fn new(window_max: usize) -> Self {
        Self {
            messages: Vec::new(),
            token_usage: TokenUsage::new(window_max),
        }
    }

    /// Rebuild a Conversation by replaying a session's full event history
    /// (spec §4.2: "Rebuilt from C1 on resume by replaying events; the last
    /// `compact_boundary` in the file partitions history so that anything
    /// before it is dropped in favor of the following `compact_summary`'s
    /// payload").
    #[must_use]
    pub fn rebuild_from_events(events: &[Event], window_max: usize) -> Self {
        let start = last_compact_boundary_index(events).map_or(0, |i| i + 1);
        let mut conversation = Self::new(window_max);
        let mut pending_tool_calls: Vec<ToolCall> = Vec::new();

        for event in &events[start..] {
            match event.kind {
                EventKind::CompactSummary => {
                    flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);
                    if let Ok(payload) =
                        serde_json::from_value::<CompactSummaryPayload>(event.payload.clone())
                    {
                        conversation.messages.push(Message::user(payload.text));
                    }
                },
                EventKind::CompactBoundary => {
                    // Only the final boundary is meaningful and it was
                    // already consumed by `last_compact_boundary_index`;
                    // any earlier one in this slice is a defensive no-op.
                },
                EventKind::User => {
                    flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);
                    if let Ok(payload) = serde_json::from_value::<UserPayload>(event.payload.clone()) {
                        conversation.messages.push(Message::user(payload.text));
                    }
                },
                EventKind::System => {
                    flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);
                    if let Ok(payload) = serde_json::from_value::<SystemPayload>(event.payload.clone()) {
                        conversation.messages.push(Message::system(payload.text));
                    }
                },
                EventKind::Assistant => {
                    flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);
                    if let Ok(payload) =
                        serde_json::from_value::<AssistantPayload>(event.payload.clone())
                    {
                        if let Some(text) = payload.text {
                            conversation.messages.push(Message::assistant(text));
                        }
                    }
                },
                EventKind::ToolCall => {
                    if let Ok(payload) =
                        serde_json::from_value::<ToolCallPayload>(event.payload.clone())
                    {
                        pending_tool_calls.push(
                            ToolCall::new(payload.id, payload.name).with_arguments(payload.arguments),
                        );
                    }
                },
                EventKind::ToolResult => {
                    flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);
                    if let Ok(payload) =
                        serde_json::from_value::<ToolResultPayload>(event.payload.clone())
                    {
                        let result = if payload.is_error {
                            ToolCallResult::error(payload.tool_call_id, payload.content)
                        } else {
                            ToolCallResult::success(payload.tool_call_id, payload.content)
                        };
                        conversation.messages.push(Message::tool_result(result));
                    }
                },
            }
        }
        flush_pending_tool_calls(&mut conversation.messages, &mut pending_tool_calls);

        conversation
    }

    /// Append a message directly (used by the agent loop as it finalizes
    /// each step; the log append and the in-memory mirror are kept
    /// separate so the loop controls their exact ordering).
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The full message sequence, including any orphan tool messages left
    /// over from a prior compaction (use [`Self::messages_for_llm`] when
    /// building a request).
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the message sequence wholesale (used after compaction).
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// The message sequence to hand the LLM: orphan `tool` messages (no
    /// resolvable `tool_call_id` earlier in the slice) are filtered out
    /// (spec §4.2, §8 property 3).
    #[must_use]
    pub fn messages_for_llm(&self) -> Vec<Message> {
        filter_orphan_tool_messages(&self.messages)
    }

    /// Current token accounting.
    #[must_use]
    pub fn token_usage(&self) -> TokenUsage {
        self.token_usage
    }

    /// Apply a `usage` delta reported mid-stream.
    pub fn update_token_usage(&mut self, input_tokens: usize, output_tokens: usize, cumulative_tokens: Option<usize>) {
        self.token_usage.update(input_tokens, output_tokens, cumulative_tokens);
    }

    /// Whether the input-token ratio has crossed `threshold_ratio` (spec
    /// §4.6 trigger condition).
    #[must_use]
    pub fn exceeds_threshold(&self, threshold_ratio: f64) -> bool {
        self.token_usage.ratio() > threshold_ratio
    }

    /// An independent copy for a reader on another task (spec §4.2:
    /// "other threads read via snapshot copy").
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// Find the index of the last `compact_boundary` event, if any.
fn last_compact_boundary_index(events: &[Event]) -> Option<usize> {
    events
        .iter()
        .enumerate()
        .rev()
        .find(|(_, e)| e.kind == EventKind::CompactBoundary)
        .map(|(i, _)| i)
}

/// Flush accumulated tool-call fragments into a single assistant message
/// carrying all of them (spec §9 Open Question 1: re-attach tool_use
/// details to the assistant message for higher LLM fidelity).
fn flush_pending_tool_calls(messages: &mut Vec<Message>, pending: &mut Vec<ToolCall>) {
    if !pending.is_empty() {
        messages.push(Message::assistant_with_tools(std::mem::take(pending)));
    }
}

/// Drop any `tool` message whose `tool_call_id` doesn't resolve to a
/// preceding assistant `ToolCall` in `messages` (spec §4.2, §8 property 3).
fn filter_orphan_tool_messages(messages: &[Message]) -> Vec<Message> {
    let mut known_call_ids = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(messages.len());

    for message in messages {
        if message.role == MessageRole::Assistant {
            if let Some(calls) = message.tool_calls() {
                for call in calls {
                    known_call_ids.insert(call.id.clone());
                }
            }
        }

        if message.role == MessageRole::Tool {
            let resolves = match &message.content {
                turnloop_llm::MessageContent::ToolResult(result) => known_call_ids.contains(&result.call_id),
                _ => false,
            };
            if !resolves {
                continue;
            }
        }

        result.push(message.clone());
    }

    result
}

/// Used by [`crate::compaction::CompactionService`] to tag the boundary it
/// writes (kept here so both modules agree on the wire vocabulary).
#[must_use]
pub fn trigger_subkind(trigger: CompactTrigger) -> &'static str {
    match trigger {
        CompactTrigger::Auto => "auto",
        CompactTrigger::Manual => "manual",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnloop_core::SessionId;
    use turnloop_llm::ToolCallResult;

    fn event(id: u64, parent: Option<u64>, kind: EventKind, payload: serde_json::Value) -> Event {
        Event::new(id, parent, SessionId::from_existing("s1"), "/ws", kind, payload)
    }

    #[test]
    fn rebuild_reconstructs_simple_exchange() {
        let events = vec![
            event(1, None, EventKind::User, serde_json::json!({"text": "hi"})),
            event(2, Some(1), EventKind::Assistant, serde_json::json!({"text": "hello"})),
        ];
        let conversation = Conversation::rebuild_from_events(&events, 100_000);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[0].text(), Some("hi"));
    }

    #[test]
    fn rebuild_reattaches_tool_calls_to_assistant_turn() {
        let events = vec![
            event(1, None, EventKind::User, serde_json::json!({"text": "list files"})),
            event(2, Some(1), EventKind::Assistant, serde_json::json!({})),
            event(
                3,
                Some(2),
                EventKind::ToolCall,
                serde_json::json!({"id": "call_1", "name": "glob", "arguments": {}}),
            ),
            event(
                4,
                Some(3),
                EventKind::ToolResult,
                serde_json::json!({"tool_call_id": "call_1", "content": "a.txt", "is_error": false}),
            ),
        ];
        let conversation = Conversation::rebuild_from_events(&events, 100_000);
        // user, assistant(tool_calls), tool_result
        assert_eq!(conversation.messages().len(), 3);
        assert!(conversation.messages()[1].tool_calls().is_some());
    }

    #[test]
    fn rebuild_drops_history_before_last_compaction() {
        let events = vec![
            event(1, None, EventKind::User, serde_json::json!({"text": "old"})),
            event(2, Some(1), EventKind::CompactBoundary, serde_json::json!({})),
            event(
                3,
                Some(2),
                EventKind::CompactSummary,
                serde_json::json!({"text": "summary of old stuff"}),
            ),
            event(4, Some(3), EventKind::User, serde_json::json!({"text": "new"})),
        ];
        let conversation = Conversation::rebuild_from_events(&events, 100_000);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[0].text(), Some("summary of old stuff"));
        assert_eq!(conversation.messages()[1].text(), Some("new"));
    }

    #[test]
    fn messages_for_llm_filters_orphan_tool_results() {
        let mut conversation = Conversation::new(100_000);
        conversation.push(Message::tool_result(ToolCallResult::success("dangling", "x")));
        conversation.push(Message::user("hi"));
        let filtered = conversation.messages_for_llm();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text(), Some("hi"));
    }

    #[test]
    fn token_usage_ratio_reflects_window() {
        let mut usage = TokenUsage::new(1000);
        usage.update(850, 10, None);
        assert!(usage.ratio() > 0.8);
    }

    #[test]
    fn estimated_cost_scales_with_token_counts() {
        let mut usage = TokenUsage::new(200_000);
        usage.update(1000, 1000, None);
        let cost = usage.estimated_cost_usd();
        assert!((cost - 0.018).abs() < 1e-9);
    }
}
