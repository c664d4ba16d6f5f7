//! The Agent Loop (spec §4.7 C7): the per-turn state machine driving the
//! LLM, tool dispatch, and compaction.
//!
//! Grounded in the teacher's `astrid-runtime::agent_loop`: the same
//! streaming-delta accumulation and step-budget enforcement, narrowed to
//! this engine's single `LlmProvider` abstraction and its own event
//! vocabulary.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use turnloop_core::log::{EventDraft, SessionLogStore};
use turnloop_core::{CompactTrigger, EventKind, SessionId};
use turnloop_core::error::UserFacingError;
use turnloop_events::{AgentEvent, EventBus, EventMetadata};
use turnloop_hooks::{HookDefinition, HookDispatcher, HookPayload};
use turnloop_llm::{ChatParams, LlmProvider, Message, StreamEvent, StopReason, ToolCall};
use turnloop_permission::{Decision, PermissionEngine, ToolCallRequest};
use turnloop_tools::{Invoker, Tool, ToolContext};

use crate::compaction::CompactionService;
use crate::conversation::Conversation;
use crate::error::{RuntimeError, RuntimeResult};
use crate::payload::{AssistantPayload, ToolCallPayload, ToolResultPayload};

/// Why a turn ended (spec §4.7, §4.8 `turn_ended.reason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEndReason {
    /// The assistant produced a final reply with no further tool calls.
    EndOfTurn,
    /// The turn was cancelled mid-flight.
    Cancelled,
    /// `max_steps` was exceeded without reaching end-of-turn.
    StepBudgetExhausted,
}

impl TurnEndReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::EndOfTurn => "end_of_turn",
            Self::Cancelled => "cancelled",
            Self::StepBudgetExhausted => "step_budget_exhausted",
        }
    }
}

/// Everything the loop needs to drive one turn to completion.
pub struct AgentLoop {
    llm: Arc<dyn LlmProvider>,
    invoker: Arc<Invoker>,
    permission_engine: Arc<PermissionEngine>,
    bus: Arc<EventBus>,
    compaction: CompactionService,
    post_tool_use_hooks: Vec<HookDefinition>,
    dispatcher: HookDispatcher,
    system_prompt: String,
    max_steps: usize,
}

impl AgentLoop {
    /// Build a loop over the given components.
    ///
    /// `PreToolUse` hooks are not configured here: [`PermissionEngine::decide`]
    /// already runs them as its own step 4 (hook veto, `updated_input`
    /// accumulation), so the loop only needs the hooks that run after a
    /// call completes.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        invoker: Arc<Invoker>,
        permission_engine: Arc<PermissionEngine>,
        bus: Arc<EventBus>,
        compaction: CompactionService,
        post_tool_use_hooks: Vec<HookDefinition>,
        dispatcher: HookDispatcher,
        system_prompt: impl Into<String>,
        max_steps: usize,
    ) -> Self {
        Self {
            llm,
            invoker,
            permission_engine,
            bus,
            compaction,
            post_tool_use_hooks,
            dispatcher,
            system_prompt: system_prompt.into(),
            max_steps: max_steps.max(1),
        }
    }

    /// Run one full turn: repeated steps of (maybe compact) → LLM call →
    /// (maybe tool dispatch) until end-of-turn, cancellation, or the step
    /// budget is exhausted.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        workspace_root: &std::path::Path,
        log: &SessionLogStore,
        conversation: &mut Conversation,
        tool_ctx: &ToolContext,
        turn_id: u64,
        cancellation: CancellationToken,
    ) -> RuntimeResult<TurnEndReason> {
        self.bus.publish(AgentEvent::TurnStarted {
            metadata: EventMetadata::new("agent_loop"),
            session_id: session_id.clone(),
            turn_id,
        });

        let mut last_event_id = log
            .read_all()
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?
            .last()
            .map(|e| e.id);

        let reason = 'turn: loop {
            if cancellation.is_cancelled() {
                break 'turn TurnEndReason::Cancelled;
            }

            // Step 1: compact if warranted.
            if self.compaction.should_compact(conversation) {
                self.bus.publish(AgentEvent::CompactionStarted {
                    metadata: EventMetadata::new("agent_loop"),
                    session_id: session_id.clone(),
                });
                match self
                    .compaction
                    .compact(
                        session_id,
                        workspace_root,
                        log,
                        conversation,
                        CompactTrigger::Auto,
                        last_event_id,
                    )
                    .await?
                {
                    Some(result) => {
                        self.bus.publish(AgentEvent::CompactionCompleted {
                            metadata: EventMetadata::new("agent_loop"),
                            session_id: session_id.clone(),
                            pre_tokens: result.pre_tokens,
                            post_tokens: result.post_tokens,
                        });
                    },
                    None => debug!("compaction vetoed; continuing with current context"),
                }
                last_event_id = log
                    .read_all()
                    .await
                    .map_err(|e| RuntimeError::StorageError(e.to_string()))?
                    .last()
                    .map(|e| e.id);
            }

            let mut step_count = 0usize;
            let step_reason = loop {
                step_count += 1;
                if step_count > self.max_steps {
                    break TurnEndReason::StepBudgetExhausted;
                }

                let step_outcome = self
                    .run_step(session_id, log, conversation, tool_ctx, turn_id, &cancellation, &mut last_event_id)
                    .await?;

                match step_outcome {
                    StepOutcome::HasMoreWork => continue,
                    StepOutcome::EndOfTurn => break TurnEndReason::EndOfTurn,
                    StepOutcome::Cancelled => break TurnEndReason::Cancelled,
                }
            };
            break 'turn step_reason;
        };

        self.bus.flush_turn(turn_id);
        self.bus.publish(AgentEvent::TurnEnded {
            metadata: EventMetadata::new("agent_loop"),
            turn_id,
            reason: reason.as_str().to_string(),
        });
        Ok(reason)
    }

    async fn run_step(
        &self,
        session_id: &SessionId,
        log: &SessionLogStore,
        conversation: &mut Conversation,
        tool_ctx: &ToolContext,
        turn_id: u64,
        cancellation: &CancellationToken,
        last_event_id: &mut Option<u64>,
    ) -> RuntimeResult<StepOutcome> {
        // Step 2: build the request.
        let tool_defs = self.invoker.registry().all_definitions();
        let params = ChatParams {
            temperature: 0.7,
            max_tokens: 4096,
            system: self.system_prompt.clone(),
        };
        let messages = conversation.messages_for_llm();

        // Step 3: open the stream and accumulate deltas.
        let mut stream = match self.llm.chat(&messages, &tool_defs, &params).await {
            Ok(stream) => stream,
            Err(error) => return self.turn_error(turn_id, error).await,
        };

        let mut text = String::new();
        let mut tool_fragments: HashMap<String, (Option<String>, String)> = HashMap::new();
        let mut tool_order: Vec<String> = Vec::new();
        let mut stop_reason = StopReason::EndOfTurn;

        loop {
            let Some(event) = stream.next().await else { break };
            match event {
                Ok(StreamEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    self.bus.publish(AgentEvent::AssistantTextChunk {
                        metadata: EventMetadata::new("agent_loop"),
                        turn_id,
                        text: delta,
                    });
                },
                Ok(StreamEvent::ReasoningDelta(delta)) => {
                    self.bus.publish(AgentEvent::AssistantThinkingChunk {
                        metadata: EventMetadata::new("agent_loop"),
                        turn_id,
                        text: delta,
                    });
                },
                Ok(StreamEvent::ToolCallDelta { id, name, arguments_fragment }) => {
                    let first_seen = !tool_fragments.contains_key(&id);
                    let entry = tool_fragments.entry(id.clone()).or_insert((None, String::new()));
                    if let Some(name) = name {
                        entry.0 = Some(name);
                    }
                    entry.1.push_str(&arguments_fragment);
                    if first_seen {
                        tool_order.push(id.clone());
                        if let Some(name) = &entry.0 {
                            self.bus.publish(AgentEvent::ToolCallStart {
                                metadata: EventMetadata::new("agent_loop"),
                                turn_id,
                                tool_name: name.clone(),
                                call_id: id,
                            });
                        }
                    }
                },
                Ok(StreamEvent::Usage { input_tokens, output_tokens, cumulative_tokens }) => {
                    conversation.update_token_usage(input_tokens, output_tokens, cumulative_tokens);
                },
                Ok(StreamEvent::End(reason)) => {
                    stop_reason = reason;
                    break;
                },
                Err(error) => return self.turn_error(turn_id, error).await,
            }
        }

        // Step 4: finalize the assistant message and append its event(s).
        let tool_calls: Vec<ToolCall> = tool_order
            .iter()
            .filter_map(|id| {
                let (name, args) = tool_fragments.get(id)?;
                let name = name.clone()?;
                let arguments = serde_json::from_str(args).unwrap_or(json!({}));
                Some(ToolCall::new(id.clone(), name).with_arguments(arguments))
            })
            .collect();

        let assistant_text = if text.is_empty() { None } else { Some(text.clone()) };
        let assistant_event = log
            .append(EventDraft::new(
                EventKind::Assistant,
                serde_json::to_value(AssistantPayload { text: assistant_text.clone() })
                    .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
            ))
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;
        *last_event_id = Some(assistant_event.id);

        if let Some(text) = assistant_text {
            conversation.push(Message::assistant(text));
        }
        if !tool_calls.is_empty() {
            conversation.push(Message::assistant_with_tools(tool_calls.clone()));
        }

        for call in &tool_calls {
            let call_event = log
                .append(EventDraft::new(
                    EventKind::ToolCall,
                    serde_json::to_value(ToolCallPayload {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
                ))
                .await
                .map_err(|e| RuntimeError::StorageError(e.to_string()))?;
            *last_event_id = Some(call_event.id);
        }

        if tool_calls.is_empty() {
            return Ok(StepOutcome::EndOfTurn);
        }
        if stop_reason == StopReason::ContentFilter {
            warn!("provider content filter intervened mid-turn");
        }

        // Step 5: dispatch each tool call.
        let all_concurrency_safe = tool_calls.iter().all(|call| {
            self.invoker
                .registry()
                .get(&call.name)
                .map(|t| t.concurrency_safe())
                .unwrap_or(false)
        });

        if all_concurrency_safe && tool_calls.len() > 1 {
            let futures = tool_calls.iter().map(|call| self.dispatch_tool_call(session_id, turn_id, call, tool_ctx, cancellation));
            let results = futures::future::join_all(futures).await;
            for (call, outcome) in tool_calls.iter().zip(results) {
                let outcome = self.run_post_tool_use_hooks(session_id, call, outcome).await;
                self.append_tool_result(log, last_event_id, conversation, call, outcome).await?;
            }
        } else {
            for call in &tool_calls {
                if cancellation.is_cancelled() {
                    return Ok(StepOutcome::Cancelled);
                }
                let outcome = self.dispatch_tool_call(session_id, turn_id, call, tool_ctx, cancellation).await;
                let outcome = self.run_post_tool_use_hooks(session_id, call, outcome).await;
                self.append_tool_result(log, last_event_id, conversation, call, outcome).await?;
            }
        }

        Ok(StepOutcome::HasMoreWork)
    }

    async fn dispatch_tool_call(
        &self,
        session_id: &SessionId,
        turn_id: u64,
        call: &ToolCall,
        tool_ctx: &ToolContext,
        _cancellation: &CancellationToken,
    ) -> ToolDispatchOutcome {
        let Some(tool) = self.invoker.registry().get(&call.name) else {
            return ToolDispatchOutcome {
                success: false,
                content: format!("unknown tool: {}", call.name),
            };
        };
        let canonical_pattern = tool.permission_rule_abstractor(&call.arguments);
        let request = ToolCallRequest::new(call.name.clone(), tool.kind(), canonical_pattern, call.arguments.clone());

        let decision = self.permission_engine.decide(&request).await;
        let (success, content) = match decision {
            Decision::Allow { updated_input } => {
                let args = updated_input.unwrap_or_else(|| call.arguments.clone());
                self.run_and_report(&args, tool_ctx, &call.name, turn_id, session_id).await
            },
            Decision::Deny(reason) | Decision::Ask(reason) => (false, reason),
        };

        self.bus.publish(AgentEvent::ToolCallComplete {
            metadata: EventMetadata::new("agent_loop"),
            turn_id,
            call_id: call.id.clone(),
            success,
        });

        ToolDispatchOutcome { success, content }
    }

    /// Run `PostToolUse`/`PostToolUseFailure` hooks for a completed call
    /// (spec §4.4: "parallel, bounded concurrency ... `additional_context`
    /// strings are concatenated") and fold their context into the result
    /// text the conversation and log will see. These sites never block: a
    /// failing hook is logged by the dispatcher and otherwise ignored.
    async fn run_post_tool_use_hooks(
        &self,
        session_id: &SessionId,
        call: &ToolCall,
        outcome: ToolDispatchOutcome,
    ) -> ToolDispatchOutcome {
        if self.post_tool_use_hooks.is_empty() {
            return outcome;
        }
        let event = if outcome.success {
            turnloop_core::HookEvent::PostToolUse
        } else {
            turnloop_core::HookEvent::PostToolUseFailure
        };
        let payload = HookPayload::new(
            event,
            session_id.clone(),
            json!({
                "tool_name": call.name,
                "arguments": call.arguments,
                "success": outcome.success,
                "content": outcome.content,
            }),
        );
        let result = self.dispatcher.dispatch(&self.post_tool_use_hooks, payload).await;
        if result.additional_context.is_empty() {
            return outcome;
        }
        let mut content = outcome.content;
        for ctx in result.additional_context {
            content.push_str("\n\n");
            content.push_str(&ctx);
        }
        ToolDispatchOutcome { content, ..outcome }
    }

    async fn run_and_report(
        &self,
        args: &serde_json::Value,
        tool_ctx: &ToolContext,
        tool_name: &str,
        _turn_id: u64,
        _session_id: &SessionId,
    ) -> (bool, String) {
        let outcome = self.invoker.invoke(tool_name, args.clone(), tool_ctx).await;
        (outcome.success, outcome.llm_content)
    }

    async fn append_tool_result(
        &self,
        log: &SessionLogStore,
        last_event_id: &mut Option<u64>,
        conversation: &mut Conversation,
        call: &ToolCall,
        outcome: ToolDispatchOutcome,
    ) -> RuntimeResult<()> {
        let result_event = log
            .append(EventDraft::new(
                EventKind::ToolResult,
                serde_json::to_value(ToolResultPayload {
                    tool_call_id: call.id.clone(),
                    content: outcome.content.clone(),
                    is_error: !outcome.success,
                })
                .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
            ))
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;
        *last_event_id = Some(result_event.id);

        let result = if outcome.success {
            turnloop_llm::ToolCallResult::success(call.id.clone(), outcome.content)
        } else {
            turnloop_llm::ToolCallResult::error(call.id.clone(), outcome.content)
        };
        conversation.push(Message::tool_result(result));
        Ok(())
    }

    /// Error handling inside a turn (spec §4.7 last paragraph): a transport
    /// error surfaces as `turn_error`. Any partial assistant text or tool
    /// call fragments accumulated this step are simply never appended (the
    /// caller returns before step 4 runs), so they are dropped by
    /// construction; tool history from already-completed steps this turn
    /// was durably appended when each of those steps ran, so it survives
    /// regardless.
    async fn turn_error(&self, turn_id: u64, error: turnloop_llm::LlmError) -> RuntimeResult<StepOutcome> {
        let runtime_error: RuntimeError = error.into();
        let user_facing: UserFacingError = runtime_error.to_user_facing();
        self.bus.publish(AgentEvent::TurnError {
            metadata: EventMetadata::new("agent_loop"),
            turn_id,
            error: user_facing,
        });
        Err(runtime_error)
    }
}

enum StepOutcome {
    HasMoreWork,
    EndOfTurn,
    Cancelled,
}

struct ToolDispatchOutcome {
    success: bool,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_end_reason_renders_spec_strings() {
        assert_eq!(TurnEndReason::EndOfTurn.as_str(), "end_of_turn");
        assert_eq!(TurnEndReason::Cancelled.as_str(), "cancelled");
        assert_eq!(TurnEndReason::StepBudgetExhausted.as_str(), "step_budget_exhausted");
    }
}
