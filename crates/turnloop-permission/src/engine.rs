//! The permission engine (spec §4.3 C3): decides {allow, deny, ask} for a
//! proposed tool call by walking mode short-circuit, session cache,
//! configured rules, hook veto, and finally a user prompt, in that order.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};
use turnloop_core::{HookEvent, SessionId};
use turnloop_hooks::{DispatchVerdict, HookDefinition, HookDispatcher, HookPayload};

use crate::cache::ApprovalCache;
use crate::mode::{PermissionMode, ShortCircuit, ToolKind};
use crate::request::{PermissionPrompt, PromptOutcome, PromptResponse, ToolCallRequest};
use crate::rule::{RuleMatch, RuleScope, RuleSet};

/// Default time to wait for a user response before treating it as
/// `reject_once` (spec §6.4).
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The final decision for a proposed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed. Carries any argument patch accumulated from `PreToolUse`
    /// hooks, to be merged into the call before invocation.
    Allow {
        /// Left-to-right merged `updated_input` from `PreToolUse` hooks,
        /// if any hook supplied one.
        updated_input: Option<serde_json::Value>,
    },
    /// Refuse the call outright.
    Deny(String),
    /// A hook asked for human confirmation even though nothing denied
    /// outright; surfaced to the caller as equivalent to falling through
    /// to the user prompt.
    Ask(String),
}

impl Decision {
    /// Shorthand for an unconditional allow with no argument patch.
    #[must_use]
    pub fn allow() -> Self {
        Self::Allow {
            updated_input: None,
        }
    }

    /// True for [`Decision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Orchestrates the five-step decision algorithm for one session.
pub struct PermissionEngine {
    session_id: SessionId,
    mode: RwLock<PermissionMode>,
    cache: ApprovalCache,
    rules: RwLock<RuleSet>,
    pre_tool_use_hooks: Vec<HookDefinition>,
    dispatcher: HookDispatcher,
    prompt: RwLock<Option<Arc<dyn PermissionPrompt>>>,
    prompt_timeout: Duration,
}

impl PermissionEngine {
    /// Build an engine for one session.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        mode: PermissionMode,
        pre_tool_use_hooks: Vec<HookDefinition>,
        dispatcher: HookDispatcher,
    ) -> Self {
        Self {
            session_id,
            mode: RwLock::new(mode),
            cache: ApprovalCache::new(),
            rules: RwLock::new(RuleSet::default()),
            pre_tool_use_hooks,
            dispatcher,
            prompt: RwLock::new(None),
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }

    /// Register the front-end's prompt handler.
    pub fn set_prompt_handler(&self, handler: Arc<dyn PermissionPrompt>) {
        *self.prompt.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Replace the active permission mode.
    pub fn set_mode(&self, mode: PermissionMode) {
        *self.mode.write().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    /// Current permission mode.
    #[must_use]
    pub fn mode(&self) -> PermissionMode {
        *self.mode.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutable access to the configured rule lists (session/project/global
    /// allow and deny rules).
    pub fn with_rules<R>(&self, f: impl FnOnce(&mut RuleSet) -> R) -> R {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        f(&mut rules)
    }

    /// The session's always-allow cache, for inspection/testing.
    #[must_use]
    pub fn cache(&self) -> &ApprovalCache {
        &self.cache
    }

    /// Decide whether `request` should proceed.
    pub async fn decide(&self, request: &ToolCallRequest) -> Decision {
        // 1. Mode short-circuit.
        let mode = self.mode();
        match mode.short_circuit(request.kind) {
            Some(ShortCircuit::Allow) => return Decision::allow(),
            Some(ShortCircuit::Deny(reason)) => return Decision::Deny(reason.to_string()),
            None => {},
        }

        // 2. Session approval cache.
        if self.cache.contains(&request.canonical_pattern) {
            debug!(pattern = %request.canonical_pattern, "allowed by session cache");
            return Decision::allow();
        }

        // 3. Configured rule match (session > project > global).
        let rule_match = {
            let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
            rules.check(&request.canonical_pattern)
        };
        match rule_match {
            RuleMatch::Denied(scope) => {
                return Decision::Deny(format!("denied by {scope:?} rule").to_lowercase());
            },
            RuleMatch::Allowed(_) => return Decision::allow(),
            RuleMatch::NoMatch => {},
        }

        // 4. Hook veto.
        if !self.pre_tool_use_hooks.is_empty() {
            let payload = HookPayload::new(
                HookEvent::PreToolUse,
                self.session_id.clone(),
                json!({
                    "tool_name": request.tool_name,
                    "canonical_pattern": request.canonical_pattern,
                    "arguments": request.raw_arguments,
                }),
            );
            let outcome = self
                .dispatcher
                .dispatch(&self.pre_tool_use_hooks, payload)
                .await;
            match outcome.verdict {
                DispatchVerdict::Deny(reason) => return Decision::Deny(reason),
                DispatchVerdict::Ask(reason) => return Decision::Ask(reason),
                DispatchVerdict::Blocked(reason) => return Decision::Deny(reason),
                DispatchVerdict::Continue => {
                    if outcome.updated_input.is_some() {
                        return self.ask_user(request, outcome.updated_input).await;
                    }
                },
            }
        }

        // 5. Ask the user.
        self.ask_user(request, None).await
    }

    async fn ask_user(
        &self,
        request: &ToolCallRequest,
        updated_input: Option<serde_json::Value>,
    ) -> Decision {
        if self.mode() == PermissionMode::Yolo {
            // Unreachable in practice (yolo short-circuits in step 1) but
            // kept as a hard guarantee per spec §4.9 item 6.
            return Decision::Allow { updated_input };
        }

        let handler = {
            let guard = self.prompt.read().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().cloned()
        };

        let Some(handler) = handler else {
            warn!("no permission prompt handler registered; treating as reject_once");
            return Decision::Deny("no user available to confirm".to_string());
        };

        let response = tokio::time::timeout(self.prompt_timeout, handler.prompt(request)).await;

        match response {
            Err(_) | Ok(None) => Self::finish(PromptOutcome::TimedOut, request, updated_input, &self.cache),
            Ok(Some(resp)) => {
                if resp == PromptResponse::RejectAlways {
                    self.rules.write().unwrap_or_else(|e| e.into_inner()).deny(
                        request.canonical_pattern.clone(),
                        RuleScope::Session,
                    );
                }
                Self::finish(
                    PromptOutcome::Responded(resp),
                    request,
                    updated_input,
                    &self.cache,
                )
            },
        }
    }

    fn finish(
        outcome: PromptOutcome,
        request: &ToolCallRequest,
        updated_input: Option<serde_json::Value>,
        cache: &ApprovalCache,
    ) -> Decision {
        match outcome {
            PromptOutcome::TimedOut => Decision::Deny("no response (timed out)".to_string()),
            PromptOutcome::Responded(PromptResponse::AllowOnce) => {
                Decision::Allow { updated_input }
            },
            PromptOutcome::Responded(PromptResponse::AllowAlways) => {
                cache.insert(request.canonical_pattern.clone());
                Decision::Allow { updated_input }
            },
            PromptOutcome::Responded(PromptResponse::RejectOnce) => {
                Decision::Deny("rejected by user".to_string())
            },
            PromptOutcome::Responded(PromptResponse::RejectAlways) => {
                Decision::Deny("rejected by user (always)".to_string())
            },
        }
    }
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("session_id", &self.session_id)
            .field("mode", &self.mode())
            .field("cache_len", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turnloop_hooks::HookDispatcher;

    fn engine(mode: PermissionMode) -> PermissionEngine {
        PermissionEngine::new(
            SessionId::from_existing("s1"),
            mode,
            Vec::new(),
            HookDispatcher::new(4),
        )
    }

    fn bash_request(pattern: &str) -> ToolCallRequest {
        ToolCallRequest::new(
            "Bash",
            ToolKind::Execute,
            pattern,
            json!({"command": pattern}),
        )
    }

    struct AlwaysRespond(PromptResponse);

    #[async_trait]
    impl PermissionPrompt for AlwaysRespond {
        async fn prompt(&self, _request: &ToolCallRequest) -> Option<PromptResponse> {
            Some(self.0)
        }
    }

    struct NeverResponds;

    #[async_trait]
    impl PermissionPrompt for NeverResponds {
        async fn prompt(&self, _request: &ToolCallRequest) -> Option<PromptResponse> {
            None
        }
    }

    #[tokio::test]
    async fn yolo_never_prompts() {
        let engine = engine(PermissionMode::Yolo);
        engine.set_prompt_handler(Arc::new(NeverResponds));
        let decision = engine.decide(&bash_request("Bash(command:rm -rf /)")).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn plan_mode_denies_execute() {
        let engine = engine(PermissionMode::Plan);
        let decision = engine.decide(&bash_request("Bash(command:ls)")).await;
        assert_eq!(
            decision,
            Decision::Deny("plan mode forbids write/execute".to_string())
        );
    }

    #[tokio::test]
    async fn session_cache_short_circuits() {
        let engine = engine(PermissionMode::Default);
        engine.cache().insert("Bash(command:git status*)");
        let decision = engine
            .decide(&bash_request("Bash(command:git status*)"))
            .await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn configured_deny_rule_wins_over_allow() {
        let engine = engine(PermissionMode::Default);
        engine.with_rules(|rules| {
            rules.allow("Bash(command:git *)", RuleScope::Global);
            rules.deny("Bash(command:git push*)", RuleScope::Global);
        });
        let decision = engine
            .decide(&bash_request("Bash(command:git push origin main)"))
            .await;
        assert!(matches!(decision, Decision::Deny(_)));
    }

    #[tokio::test]
    async fn allow_always_populates_cache() {
        let engine = engine(PermissionMode::Default);
        engine.set_prompt_handler(Arc::new(AlwaysRespond(PromptResponse::AllowAlways)));
        let decision = engine
            .decide(&bash_request("Bash(command:git status*)"))
            .await;
        assert!(decision.is_allowed());
        assert!(engine.cache().contains("Bash(command:git status*)"));

        // Second identical call now hits the cache, never the handler.
        let engine2 = engine;
        let decision2 = engine2
            .decide(&bash_request("Bash(command:git status*)"))
            .await;
        assert!(decision2.is_allowed());
    }

    #[tokio::test]
    async fn no_response_treated_as_reject_once() {
        let engine = engine(PermissionMode::Default);
        engine.set_prompt_handler(Arc::new(NeverResponds));
        let decision = engine
            .decide(&bash_request("Bash(command:curl http://x)"))
            .await;
        assert!(matches!(decision, Decision::Deny(_)));
    }

    #[tokio::test]
    async fn reject_always_adds_session_deny_rule() {
        let engine = engine(PermissionMode::Default);
        engine.set_prompt_handler(Arc::new(AlwaysRespond(PromptResponse::RejectAlways)));
        let decision = engine
            .decide(&bash_request("Bash(command:curl http://x)"))
            .await;
        assert!(matches!(decision, Decision::Deny(_)));

        let decision2 = engine
            .decide(&bash_request("Bash(command:curl http://x)"))
            .await;
        assert!(matches!(decision2, Decision::Deny(_)));
    }

    #[tokio::test]
    async fn no_handler_registered_denies_safely() {
        let engine = engine(PermissionMode::Default);
        let decision = engine
            .decide(&bash_request("Bash(command:curl http://x)"))
            .await;
        assert!(matches!(decision, Decision::Deny(_)));
    }
}
