//! The Session Manager (spec §4.9 C9): owns one session's full lifecycle
//! — start, submit, cancel, mode/model switches, and end — and serializes
//! turns through a size-one queue (spec §5 "exactly one Turn advances at
//! a time").
//!
//! Grounded in the teacher's `astrid-runtime::session` for the overall
//! lifecycle shape (builder-style construction, an `end_session` cleanup
//! method); the teacher's allowance/budget/capability bookkeeping has no
//! counterpart here; this is a plain event-log-backed conversation plus
//! the engine components C3/C6/C7 wire together.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use turnloop_config::{Config, HookEntry};
use turnloop_core::log::{EventDraft, SessionLogStore};
use turnloop_core::{EventKind, HookEvent, SessionId};
use turnloop_events::{AgentEvent, EventBus, EventMetadata, PermissionOutcome};
use turnloop_hooks::{DispatchVerdict, HookDefinition, HookDispatcher, HookPayload, HooksConfig};
use turnloop_llm::{LlmProvider, Message};
use turnloop_permission::{PermissionEngine, PermissionMode, RuleScope};
use turnloop_tools::{FileAccessTracker, Invoker, ToolContext, ToolRegistry};

use crate::agent_loop::{AgentLoop, TurnEndReason};
use crate::compaction::CompactionService;
use crate::conversation::Conversation;
use crate::error::{RuntimeError, RuntimeResult};
use crate::payload::{SystemPayload, UserPayload};
use crate::permission_bridge::EventBusPrompt;

/// Fallback system prompt used when the caller doesn't supply one. A real
/// front-end is expected to pass its own via [`AgentSession::start`].
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a coding assistant operating inside a user's workspace via a fixed set of tools.";

/// Why a session ended (spec §4.9 `end(reason)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user explicitly exited.
    UserExit,
    /// Ctrl-C was received.
    CtrlC,
    /// The Esc key cancelled interaction and the session was then closed.
    Esc,
    /// The session ended because of an unrecoverable error.
    Error,
}

impl EndReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::UserExit => "user_exit",
            Self::CtrlC => "ctrl_c",
            Self::Esc => "esc",
            Self::Error => "error",
        }
    }
}

/// Merge one lifecycle site's hooks from the two places they can come
/// from: `[[hooks.<site>]]` entries in the loaded [`Config`] (falling
/// back to [`turnloop_config::HookPolicySection`] for any field an entry
/// leaves unset) and the workspace's own `.turnloop/hooks.toml` (spec
/// §6.6, §4.4).
fn hooks_for_event(config: &Config, workspace_hooks: &HooksConfig, event: HookEvent) -> Vec<HookDefinition> {
    let from_config: Vec<HookDefinition> = config
        .hooks
        .sites
        .get(&event.to_string())
        .into_iter()
        .flatten()
        .map(|entry: &HookEntry| {
            let mut def = HookDefinition::new(event, entry.command.clone())
                .with_timeout_secs(entry.timeout_secs.unwrap_or(config.hook.default_timeout_s))
                .with_failure_behaviour(entry.failure_behaviour.unwrap_or(config.hook.failure_behaviour));
            if let Some(matcher) = &entry.matcher {
                def = def.with_matcher(matcher.clone());
            }
            def
        })
        .collect();

    let from_workspace = workspace_hooks.hooks.iter().filter(|hook| hook.event == event).cloned();

    from_config.into_iter().chain(from_workspace).collect()
}

/// The active state of one turn, for [`AgentSession::cancel`].
struct ActiveTurn {
    turn_id: u64,
    cancellation: CancellationToken,
}

/// Owns one session end-to-end: the log, the conversation, and the C3/C6/C7
/// components wired for it.
pub struct AgentSession {
    session_id: SessionId,
    workspace_root: PathBuf,
    turnloop_root: PathBuf,
    log: SessionLogStore,
    conversation: RwLock<Conversation>,
    bus: Arc<EventBus>,
    permission_engine: Arc<PermissionEngine>,
    prompt_bridge: Arc<EventBusPrompt>,
    agent_loop: AgentLoop,
    tool_ctx: ToolContext,
    user_prompt_submit_hooks: Vec<HookDefinition>,
    session_end_hooks: Vec<HookDefinition>,
    dispatcher: HookDispatcher,
    turn_gate: Mutex<()>,
    active_turn: Mutex<Option<ActiveTurn>>,
    turn_counter: AtomicU64,
    pending_model: RwLock<Option<String>>,
}

impl AgentSession {
    /// Start a session rooted at `workspace_root`: allocate or resume its
    /// id, open its log store (replaying it if resuming), load its
    /// permission rules, and wire C3/C6/C7 (spec §4.9 `start`).
    ///
    /// # Errors
    ///
    /// Returns an error if the log store cannot be opened or a malformed
    /// event cannot be replayed into [`Conversation`].
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        config: &Config,
        turnloop_root: PathBuf,
        workspace_root: PathBuf,
        resume_id: Option<String>,
        llm: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        system_prompt: Option<String>,
        bus: Arc<EventBus>,
    ) -> RuntimeResult<Self> {
        let session_id = match resume_id {
            Some(id) => SessionId::from_existing(id),
            None => SessionId::new(),
        };

        let log = SessionLogStore::open(&turnloop_root, &workspace_root, session_id.clone())
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;
        if log.is_degraded() {
            warn!(session_id = %session_id, "resuming a log-degraded session");
        }

        let window_max = llm.max_context_length();
        let events = log.read_all().await.map_err(|e| RuntimeError::StorageError(e.to_string()))?;
        let conversation = if events.is_empty() {
            Conversation::new(window_max)
        } else {
            Conversation::rebuild_from_events(&events, window_max)
        };

        let workspace_hooks = HooksConfig::load_if_present(&HooksConfig::workspace_path(&workspace_root))?;
        let pre_tool_use_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::PreToolUse);
        let post_tool_use_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::PostToolUse);
        let post_tool_use_failure_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::PostToolUseFailure);
        let compaction_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::Compaction);
        let session_start_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::SessionStart);
        let user_prompt_submit_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::UserPromptSubmit);
        let session_end_hooks = hooks_for_event(config, &workspace_hooks, HookEvent::SessionEnd);

        let mut merged_post_tool_use = post_tool_use_hooks;
        merged_post_tool_use.extend(post_tool_use_failure_hooks);

        let max_parallel = 4;
        let permission_engine = Arc::new(PermissionEngine::new(
            session_id.clone(),
            config.permission_mode,
            pre_tool_use_hooks,
            HookDispatcher::new(max_parallel),
        ));
        permission_engine.with_rules(|rules| {
            for pattern in &config.permissions.allow {
                rules.allow(pattern.clone(), RuleScope::Global);
            }
            for pattern in &config.permissions.deny {
                rules.deny(pattern.clone(), RuleScope::Global);
            }
        });
        let prompt_bridge = Arc::new(EventBusPrompt::new(bus.clone()));
        permission_engine.set_prompt_handler(prompt_bridge.clone());

        let compaction = CompactionService::new(
            llm.clone(),
            compaction_hooks,
            HookDispatcher::new(max_parallel),
            config.compaction.threshold_ratio,
            config.compaction.retain_ratio,
            config.compaction.fallback_retain_ratio,
        );

        let access_tracker = Arc::new(FileAccessTracker::new());
        let cwd = Arc::new(RwLock::new(workspace_root.clone()));
        let tool_ctx =
            ToolContext::with_shared_cwd(workspace_root.clone(), session_id.clone(), cwd, access_tracker);

        let invoker = Arc::new(Invoker::new(tools));
        let agent_loop = AgentLoop::new(
            llm,
            invoker,
            permission_engine.clone(),
            bus.clone(),
            compaction,
            merged_post_tool_use,
            HookDispatcher::new(max_parallel),
            system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            config.agent.max_steps,
        );

        let session = Self {
            session_id,
            workspace_root,
            turnloop_root,
            log,
            conversation: RwLock::new(conversation),
            bus,
            permission_engine,
            prompt_bridge,
            agent_loop,
            tool_ctx,
            user_prompt_submit_hooks,
            session_end_hooks,
            dispatcher: HookDispatcher::new(max_parallel),
            turn_gate: Mutex::new(()),
            active_turn: Mutex::new(None),
            turn_counter: AtomicU64::new(0),
            pending_model: RwLock::new(None),
        };

        if !session_start_hooks.is_empty() {
            let payload = HookPayload::new(HookEvent::SessionStart, session.session_id.clone(), serde_json::json!({}));
            session.dispatcher.dispatch(&session_start_hooks, payload).await;
        }

        info!(session_id = %session.session_id, workspace_root = %session.workspace_root.display(), "session started");
        Ok(session)
    }

    /// The session's id.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The workspace root this session is bound to.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Submit a user prompt and run it to completion (spec §4.9 `submit`).
    ///
    /// Turns are serialized one at a time by `turn_gate`: a newly submitted
    /// prompt waits for any previous turn's cancellation to drain before
    /// it acquires the gate (spec §5 "Turn Controller is a queue of size
    /// one with coalescing").
    ///
    /// # Errors
    ///
    /// Propagates any [`RuntimeError`] the agent loop or log store raises.
    pub async fn submit(&self, user_input: impl Into<String>) -> RuntimeResult<TurnEndReason> {
        let _gate = self.turn_gate.lock().await;
        let user_input = user_input.into();

        let user_event = self
            .log
            .append(EventDraft::new(
                EventKind::User,
                serde_json::to_value(UserPayload { text: user_input.clone() })
                    .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
            ))
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;
        let _ = user_event;

        if !self.user_prompt_submit_hooks.is_empty() {
            let payload = HookPayload::new(
                HookEvent::UserPromptSubmit,
                self.session_id.clone(),
                serde_json::json!({ "text": user_input }),
            );
            let result = self.dispatcher.dispatch(&self.user_prompt_submit_hooks, payload).await;
            match result.verdict {
                DispatchVerdict::Continue => {},
                DispatchVerdict::Deny(reason) | DispatchVerdict::Ask(reason) | DispatchVerdict::Blocked(reason) => {
                    return Err(RuntimeError::PermissionDenied { reason });
                },
            }
        }

        {
            let mut conversation = self.conversation.write().await;
            conversation.push(Message::user(user_input));
        }

        let turn_id = self.turn_counter.fetch_add(1, Ordering::SeqCst);
        self.prompt_bridge.set_current_turn(turn_id);
        let cancellation = CancellationToken::new();
        *self.active_turn.lock().await = Some(ActiveTurn { turn_id, cancellation: cancellation.clone() });

        let mut conversation = self.conversation.write().await;
        let result = self
            .agent_loop
            .run_turn(
                &self.session_id,
                &self.workspace_root,
                &self.log,
                &mut conversation,
                &self.tool_ctx,
                turn_id,
                cancellation,
            )
            .await;
        drop(conversation);

        *self.active_turn.lock().await = None;
        result
    }

    /// Subscribe to this session's event stream (spec §4.8 C8). Each call
    /// gets an independent receiver.
    #[must_use]
    pub fn subscribe(&self) -> turnloop_events::EventReceiver {
        self.bus.subscribe()
    }

    /// Deliver a front-end's answer to a previously published
    /// `permission_request` event.
    pub fn respond_permission(&self, request_id: uuid::Uuid, outcome: PermissionOutcome) {
        self.prompt_bridge.respond(request_id, outcome);
    }

    /// Trip the current turn's cancellation token (spec §4.9 `cancel`).
    /// A no-op if no turn is in flight.
    pub async fn cancel(&self) {
        if let Some(active) = self.active_turn.lock().await.as_ref() {
            active.cancellation.cancel();
        }
    }

    /// Update the permission mode for subsequent calls; any call already
    /// in flight is unaffected (spec §4.9 `set_mode`).
    pub fn set_mode(&self, mode: PermissionMode) {
        self.permission_engine.set_mode(mode);
    }

    /// Record the model to use starting at the next turn (spec §4.9
    /// `set_model`).
    ///
    /// This engine drives a single configured [`LlmProvider`] (see
    /// DESIGN.md); there is no second provider to swap to, so this stores
    /// the requested id for reporting but does not change which provider
    /// answers the next turn.
    pub async fn set_model(&self, model_id: impl Into<String>) {
        *self.pending_model.write().await = Some(model_id.into());
    }

    /// The most recently requested (but not necessarily applied) model id.
    pub async fn pending_model(&self) -> Option<String> {
        self.pending_model.read().await.clone()
    }

    /// End the session: run `SessionEnd` hooks, flush the log, release
    /// resources (spec §4.9 `end`).
    ///
    /// # Errors
    ///
    /// Propagates a log append failure for the closing `system` event.
    pub async fn end(&self, reason: EndReason) -> RuntimeResult<()> {
        if !self.session_end_hooks.is_empty() {
            let payload = HookPayload::new(
                HookEvent::SessionEnd,
                self.session_id.clone(),
                serde_json::json!({ "reason": reason.as_str() }),
            );
            self.dispatcher.dispatch(&self.session_end_hooks, payload).await;
        }

        self.log
            .append(EventDraft::new(
                EventKind::System,
                serde_json::to_value(SystemPayload {
                    text: format!("session ended: {}", reason.as_str()),
                })
                .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
            ))
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;

        self.bus.publish(AgentEvent::TurnEnded {
            metadata: EventMetadata::new("session"),
            turn_id: self.turn_counter.load(Ordering::SeqCst),
            reason: reason.as_str().to_string(),
        });

        info!(session_id = %self.session_id, reason = reason.as_str(), "session ended");
        Ok(())
    }

    /// Where this session's log lives on disk.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// The turnloop state root this session's log was opened under.
    #[must_use]
    pub fn turnloop_root(&self) -> &Path {
        &self.turnloop_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reason_renders_spec_strings() {
        assert_eq!(EndReason::UserExit.as_str(), "user_exit");
        assert_eq!(EndReason::CtrlC.as_str(), "ctrl_c");
        assert_eq!(EndReason::Esc.as_str(), "esc");
        assert_eq!(EndReason::Error.as_str(), "error");
    }

    #[test]
    fn hooks_for_event_merges_config_and_workspace_sources() {
        let mut config = Config::default();
        config.hooks.sites.insert(
            "pre_tool_use".to_string(),
            vec![HookEntry {
                command: "echo from-config".to_string(),
                timeout_secs: None,
                failure_behaviour: None,
                matcher: None,
            }],
        );
        let workspace_hooks = HooksConfig {
            hooks: vec![HookDefinition::new(HookEvent::PreToolUse, "echo from-workspace")],
        };

        let hooks = hooks_for_event(&config, &workspace_hooks, HookEvent::PreToolUse);
        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].command, "echo from-config");
        assert_eq!(hooks[0].timeout_secs, config.hook.default_timeout_s);
        assert_eq!(hooks[1].command, "echo from-workspace");
    }

    #[test]
    fn hooks_for_event_is_empty_when_nothing_configured() {
        let config = Config::default();
        let workspace_hooks = HooksConfig::default();
        assert!(hooks_for_event(&config, &workspace_hooks, HookEvent::Stop).is_empty());
    }
}
