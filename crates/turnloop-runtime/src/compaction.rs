//! The Compaction Service (spec §4.6 C6): summarizes and truncates the
//! Conversation when the token budget is exhausted.
//!
//! Grounded in the teacher's `astrid-runtime::compaction` module: the same
//! hook-veto, important-file-scan, `<analysis>`/`<summary>` prompt template,
//! and fallback-on-failure shape, narrowed to this engine's single-provider
//! LLM abstraction.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use tracing::warn;
use turnloop_core::{CompactMetadata, CompactTrigger, EventKind, SessionId};
use turnloop_core::log::{EventDraft, SessionLogStore};
use turnloop_hooks::{DispatchVerdict, HookDefinition, HookDispatcher, HookPayload};
use turnloop_llm::{ChatParams, LlmProvider, Message, StreamEvent};

use crate::conversation::Conversation;
use crate::error::{RuntimeError, RuntimeResult};
use crate::payload::{CompactSummaryPayload, SystemPayload};

/// Maximum characters read from each important file's prefix (spec §4.6
/// step 2 "bounded prefix").
const IMPORTANT_FILE_PREFIX_BYTES: usize = 4096;

/// Maximum characters kept from any one message when building the
/// summarization prompt (spec §4.6 step 3 "truncated to a per-message
/// maximum").
const PER_MESSAGE_PROMPT_CHARS: usize = 2000;

/// Maximum number of important files read into the prompt, to keep the
/// summarization call itself bounded.
const MAX_IMPORTANT_FILES: usize = 10;

/// Low-temperature, bounded-output sampling for the summarization call
/// (spec §4.6 step 4).
const SUMMARY_TEMPERATURE: f64 = 0.2;
const SUMMARY_MAX_TOKENS: usize = 1024;

const SUMMARY_PROMPT_PREAMBLE: &str = "\
You are compacting a long coding-assistant conversation so it can continue \
within a smaller context window. Read the conversation and any referenced \
file contents below, then respond with exactly two sections:

<analysis>
A terse accounting of what has happened: goals stated, decisions made, files \
touched, and outstanding work.
</analysis>
<summary>
A dense prose summary that could replace everything above it without losing \
anything a continuing agent would need.
</summary>";

/// Drives the full compaction algorithm (spec §4.6).
pub struct CompactionService {
    llm: Arc<dyn LlmProvider>,
    compaction_hooks: Vec<HookDefinition>,
    dispatcher: HookDispatcher,
    threshold_ratio: f64,
    retain_ratio: f64,
    fallback_retain_ratio: f64,
}

/// Outcome of running compaction once.
pub struct CompactionResult {
    /// Input-token count observed just before compaction.
    pub pre_tokens: usize,
    /// Input-token count of the replacement conversation, recomputed with
    /// the provider's own token accounting heuristic.
    pub post_tokens: usize,
    /// Whether the fallback path was used.
    pub used_fallback: bool,
}

impl CompactionService {
    /// Build a compaction service.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        compaction_hooks: Vec<HookDefinition>,
        dispatcher: HookDispatcher,
        threshold_ratio: f64,
        retain_ratio: f64,
        fallback_retain_ratio: f64,
    ) -> Self {
        Self {
            llm,
            compaction_hooks,
            dispatcher,
            threshold_ratio,
            retain_ratio,
            fallback_retain_ratio,
        }
    }

    /// Whether `conversation`'s token usage warrants running compaction
    /// (spec §4.6 trigger condition, checked by the agent loop each step).
    #[must_use]
    pub fn should_compact(&self, conversation: &Conversation) -> bool {
        conversation.exceeds_threshold(self.threshold_ratio)
    }

    /// Run the full compaction algorithm, mutating nothing directly:
    /// callers replace their `Conversation` and append the returned events
    /// to the log themselves so ordering around other turn bookkeeping
    /// stays in the agent loop's hands.
    ///
    /// Returns `Ok(None)` if a `Compaction` hook vetoed the run.
    pub async fn compact(
        &self,
        session_id: &SessionId,
        workspace_root: &Path,
        log: &SessionLogStore,
        conversation: &mut Conversation,
        trigger: CompactTrigger,
        last_event_id: Option<u64>,
    ) -> RuntimeResult<Option<CompactionResult>> {
        // 1. Hook veto.
        if !self.compaction_hooks.is_empty() {
            let payload = HookPayload::new(
                turnloop_core::HookEvent::Compaction,
                session_id.clone(),
                json!({"trigger": trigger}),
            );
            let outcome = self.dispatcher.dispatch(&self.compaction_hooks, payload).await;
            if let DispatchVerdict::Blocked(reason) | DispatchVerdict::Deny(reason) = outcome.verdict {
                warn!(reason, "compaction vetoed by hook");
                return Ok(None);
            }
        }

        let pre_tokens = conversation.token_usage().input_tokens;
        let messages = conversation.messages().to_vec();

        // 2. Important files.
        let important_files = scan_important_files(&messages);
        let mut files_included = Vec::new();
        let mut file_contents = String::new();
        for path in important_files.iter().take(MAX_IMPORTANT_FILES) {
            if let Some(content) = read_bounded_prefix(workspace_root, path).await {
                files_included.push(path.clone());
                file_contents.push_str(&format!("\n--- {path} ---\n{content}\n"));
            }
        }

        // 3-5. Summarize, with fallback on any failure.
        let summary = match self.summarize(&messages, &file_contents).await {
            Ok(text) => text,
            Err(error) => {
                warn!(error = %error, "compaction summarization failed; using fallback");
                return self
                    .fallback(log, conversation, trigger, pre_tokens, last_event_id)
                    .await
                    .map(Some);
            },
        };

        // 6. Retain suffix.
        let retain_count = retain_count(messages.len(), self.retain_ratio);
        let retained: Vec<Message> = messages[messages.len() - retain_count..].to_vec();

        // 7. Filter orphans within the retained slice.
        let retained = filter_orphans_in_slice(retained);

        // 8. Write compact_boundary + compact_summary.
        let metadata = CompactMetadata {
            trigger,
            pre_tokens,
            post_tokens: None,
            files_included,
        };
        log.append(
            EventDraft::new(EventKind::CompactBoundary, json!({}))
                .with_subkind("compact_boundary")
                .with_compact_metadata(metadata),
        )
        .await
        .map_err(|e| RuntimeError::StorageError(e.to_string()))?;

        let mut summary_draft =
            EventDraft::new(EventKind::CompactSummary, serde_json::to_value(CompactSummaryPayload {
                text: summary.clone(),
            }).map_err(|e| RuntimeError::SerializationError(e.to_string()))?);
        if let Some(last_id) = last_event_id {
            summary_draft = summary_draft.with_logical_parent(last_id);
        }
        log.append(summary_draft)
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;

        // 9. Replace Conversation and recompute TokenUsage.
        let mut new_messages = vec![Message::user(summary)];
        new_messages.extend(retained);
        let post_tokens = estimate_tokens(&self.llm, &new_messages);
        conversation.set_messages(new_messages);
        conversation.update_token_usage(post_tokens, 0, conversation.token_usage().cumulative_tokens);

        Ok(Some(CompactionResult {
            pre_tokens,
            post_tokens,
            used_fallback: false,
        }))
    }

    async fn summarize(&self, messages: &[Message], file_contents: &str) -> RuntimeResult<String> {
        let prompt = build_summary_prompt(messages, file_contents);
        let params = ChatParams {
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: SUMMARY_MAX_TOKENS,
            system: SUMMARY_PROMPT_PREAMBLE.to_string(),
        };

        let mut stream = self.llm.chat(&[Message::user(prompt)], &[], &params).await?;

        let mut response = String::new();
        use futures::StreamExt;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta(text) => response.push_str(&text),
                StreamEvent::End(_) => break,
                _ => {},
            }
        }

        Ok(extract_summary(&response).unwrap_or(response))
    }

    async fn fallback(
        &self,
        log: &SessionLogStore,
        conversation: &mut Conversation,
        trigger: CompactTrigger,
        pre_tokens: usize,
        last_event_id: Option<u64>,
    ) -> RuntimeResult<CompactionResult> {
        const FALLBACK_MESSAGE: &str = "[Automatic compaction failed; using fallback]";

        let messages = conversation.messages().to_vec();
        let retain_count = retain_count(messages.len(), self.fallback_retain_ratio);
        let retained = filter_orphans_in_slice(messages[messages.len() - retain_count..].to_vec());

        let metadata = CompactMetadata {
            trigger,
            pre_tokens,
            post_tokens: None,
            files_included: Vec::new(),
        };
        log.append(
            EventDraft::new(EventKind::CompactBoundary, json!({}))
                .with_subkind("compact_boundary")
                .with_compact_metadata(metadata),
        )
        .await
        .map_err(|e| RuntimeError::StorageError(e.to_string()))?;

        let mut summary_draft = EventDraft::new(
            EventKind::CompactSummary,
            serde_json::to_value(CompactSummaryPayload {
                text: FALLBACK_MESSAGE.to_string(),
            })
            .map_err(|e| RuntimeError::SerializationError(e.to_string()))?,
        );
        if let Some(last_id) = last_event_id {
            summary_draft = summary_draft.with_logical_parent(last_id);
        }
        log.append(summary_draft)
            .await
            .map_err(|e| RuntimeError::StorageError(e.to_string()))?;

        let mut new_messages = vec![Message::user(FALLBACK_MESSAGE)];
        new_messages.extend(retained);
        let post_tokens = estimate_tokens(&self.llm, &new_messages);
        conversation.set_messages(new_messages);
        conversation.update_token_usage(post_tokens, 0, conversation.token_usage().cumulative_tokens);

        Ok(CompactionResult {
            pre_tokens,
            post_tokens,
            used_fallback: true,
        })
    }
}

/// `EventKind::System` wrapper used for the hook-veto log entry, kept for
/// symmetry even though no caller currently reads it back; left here as the
/// obvious place a future "compaction vetoed" audit event would live.
#[allow(dead_code)]
fn veto_system_payload(reason: &str) -> SystemPayload {
    SystemPayload {
        text: format!("compaction vetoed: {reason}"),
    }
}

fn retain_count(total: usize, ratio: f64) -> usize {
    ((total as f64) * ratio).ceil() as usize
}

fn estimate_tokens(llm: &Arc<dyn LlmProvider>, messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| llm.count_tokens(m.text().unwrap_or_default()))
        .sum()
}

/// Scan path-like tokens out of user messages and tool outputs (spec §4.6
/// step 2 "simple scan for path-like tokens").
fn scan_important_files(messages: &[Message]) -> Vec<String> {
    let pattern = Regex::new(r"(?:[\w./-]+/)?[\w.-]+\.\w+").expect("static regex is valid");
    let mut seen = std::collections::HashSet::new();
    let mut paths = Vec::new();

    for message in messages {
        let text = match &message.content {
            turnloop_llm::MessageContent::Text(t) => t.clone(),
            turnloop_llm::MessageContent::ToolResult(r) => r.content.clone(),
            _ => continue,
        };
        for m in pattern.find_iter(&text) {
            let candidate = m.as_str().to_string();
            if seen.insert(candidate.clone()) {
                paths.push(candidate);
            }
        }
    }
    paths
}

async fn read_bounded_prefix(workspace_root: &Path, relative_or_absolute: &str) -> Option<String> {
    let path = Path::new(relative_or_absolute);
    let full_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    };

    let content = tokio::fs::read(&full_path).await.ok()?;
    let prefix = &content[..content.len().min(IMPORTANT_FILE_PREFIX_BYTES)];
    Some(String::from_utf8_lossy(prefix).to_string())
}

fn build_summary_prompt(messages: &[Message], file_contents: &str) -> String {
    let mut prompt = String::new();
    for message in messages {
        let text = match &message.content {
            turnloop_llm::MessageContent::Text(t) => t.clone(),
            turnloop_llm::MessageContent::ToolResult(r) => r.content.clone(),
            turnloop_llm::MessageContent::ToolCalls(calls) => calls
                .iter()
                .map(|c| format!("[called {} with {}]", c.name, c.arguments))
                .collect::<Vec<_>>()
                .join(", "),
            turnloop_llm::MessageContent::MultiPart(_) => "[multi-part content]".to_string(),
        };
        let truncated: String = text.chars().take(PER_MESSAGE_PROMPT_CHARS).collect();
        prompt.push_str(&format!("{:?}: {truncated}\n", message.role));
    }
    if !file_contents.is_empty() {
        prompt.push_str("\nReferenced file contents:\n");
        prompt.push_str(file_contents);
    }
    prompt
}

/// Extract the `<summary>...</summary>` block (spec §4.6 step 5).
fn extract_summary(response: &str) -> Option<String> {
    let start = response.find("<summary>")? + "<summary>".len();
    let end = response[start..].find("</summary>")? + start;
    Some(response[start..end].trim().to_string())
}

fn filter_orphans_in_slice(messages: Vec<Message>) -> Vec<Message> {
    let mut known_call_ids = std::collections::HashSet::new();
    for message in &messages {
        if let Some(calls) = message.tool_calls() {
            for call in calls {
                known_call_ids.insert(call.id.clone());
            }
        }
    }
    messages
        .into_iter()
        .filter(|m| match &m.content {
            turnloop_llm::MessageContent::ToolResult(result) => known_call_ids.contains(&result.call_id),
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_summary_pulls_the_tagged_block() {
        let response = "<analysis>blah</analysis>\n<summary>the real summary</summary>";
        assert_eq!(extract_summary(response), Some("the real summary".to_string()));
    }

    #[test]
    fn extract_summary_returns_none_without_tags() {
        assert_eq!(extract_summary("no tags here"), None);
    }

    #[test]
    fn retain_count_rounds_up() {
        assert_eq!(retain_count(10, 0.2), 2);
        assert_eq!(retain_count(11, 0.2), 3);
    }

    #[test]
    fn scan_important_files_finds_path_like_tokens() {
        let messages = vec![Message::user("please check src/lib.rs and also notes.txt")];
        let files = scan_important_files(&messages);
        assert!(files.iter().any(|f| f.ends_with("notes.txt")));
    }

    #[test]
    fn filter_orphans_drops_unmatched_tool_results() {
        use turnloop_llm::ToolCallResult;
        let messages = vec![
            Message::tool_result(ToolCallResult::success("dangling", "x")),
            Message::user("hi"),
        ];
        let filtered = filter_orphans_in_slice(messages);
        assert_eq!(filtered.len(), 1);
    }
}
