//! The conversational execution loop: one user turn in, zero or more tool
//! dispatches, one rendered reply out.
//!
//! Owns the message history and the dispatch kernel reference exclusively;
//! nothing outside this type ever mutates `messages` directly (§3,
//! "ownership"). `process_message` is what both the interactive `run`
//! command and the daemon transport drive.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use bastion_core::{ChatRole, ContentBlock, LLMProvider, Message, StopReason};

use crate::config::{ExecutionConfig, RateLimitConfig};
use crate::dispatch::DispatchKernel;
use crate::error::BastionError;
use crate::events::{EventSink, LoopEvent};
use crate::history::trim_history;
use crate::llm_retry::{call_with_retry, RetryNotice, RetryOutcome};

pub struct ConversationLoop {
    provider: Arc<dyn LLMProvider>,
    kernel: Arc<DispatchKernel>,
    sink: Arc<dyn EventSink>,
    messages: Vec<Message>,
    cancel: CancellationToken,
    max_tool_iterations: usize,
    max_conversation_tokens: usize,
    tool_result_truncate_chars: usize,
    rate_limit: RateLimitConfig,
}

impl ConversationLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        kernel: Arc<DispatchKernel>,
        sink: Arc<dyn EventSink>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            provider,
            kernel,
            sink,
            messages: Vec::new(),
            cancel: CancellationToken::new(),
            max_tool_iterations: config.max_tool_iterations,
            max_conversation_tokens: config.max_conversation_tokens,
            tool_result_truncate_chars: config.tool_result_truncate_chars,
            rate_limit: config.rate_limit.clone(),
        }
    }

    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn restore_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.cancel = CancellationToken::new();
    }

    pub fn set_cancel_event(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Interactive stdin drive: read lines off the controlling terminal
    /// (in a worker, so it never blocks the runtime) until `/quit`,
    /// `/exit`, or end-of-input.
    pub async fn run(&mut self) -> Result<(), BastionError> {
        loop {
            print!("> ");
            use std::io::Write;
            let _ = std::io::stdout().flush();

            let Some(line) = read_stdin_line().await else {
                break;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "/quit" || trimmed == "/exit" {
                break;
            }

            match self.process_message(trimmed).await {
                Ok(()) => {}
                Err(BastionError::CancelledByUser) => {
                    self.sink.emit(LoopEvent::Info("Operation cancelled.".to_string()));
                }
                Err(e) => {
                    self.sink.emit(LoopEvent::Error(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// One full turn: append the user message, iterate tool-use rounds
    /// until `end_turn` or the iteration cap, return.
    pub async fn process_message(&mut self, text: &str) -> Result<(), BastionError> {
        self.messages.push(Message::user_text(text));

        for _iteration in 1..=self.max_tool_iterations {
            if self.cancel.is_cancelled() {
                return Err(BastionError::CancelledByUser);
            }

            if let Some((removed, remaining, estimate)) =
                trim_history(&mut self.messages, self.max_conversation_tokens)
            {
                tracing::info!(removed, remaining, estimate, "history_trimmed");
            }

            let tools = self.kernel.get_schemas();
            let outcome = call_with_retry(
                self.provider.as_ref(),
                &self.messages,
                &tools,
                &self.rate_limit,
                &self.cancel,
                |notice| {
                    let RetryNotice::RateLimited { attempt, max_attempts, wait_secs } = notice;
                    self.sink.emit(LoopEvent::Info(format!(
                        "Rate limited, retrying in {wait_secs}s (attempt {attempt}/{max_attempts})"
                    )));
                },
            )
            .await;

            let turn = match outcome {
                RetryOutcome::Ok(turn) => turn,
                RetryOutcome::Cancelled => return Err(BastionError::CancelledByUser),
                RetryOutcome::Failed(e) => {
                    self.sink.emit(LoopEvent::Error(e.to_string()));
                    if matches!(self.messages.last(), Some(m) if m.role == ChatRole::User) {
                        self.messages.pop();
                    }
                    return Ok(());
                }
            };

            self.messages.push(Message::assistant_blocks(turn.content.clone()));

            if turn.stop_reason == StopReason::EndTurn {
                for block in &turn.content {
                    if let ContentBlock::Text { text } = block {
                        self.sink.emit(LoopEvent::Response(text.clone()));
                    }
                }
                return Ok(());
            }

            let mut tool_results = Vec::new();
            for block in &turn.content {
                match block {
                    ContentBlock::Text { text } => {
                        self.sink.emit(LoopEvent::Info(text.clone()));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        if self.cancel.is_cancelled() {
                            tool_results.push(ContentBlock::ToolResult {
                                tool_use_id: id.clone(),
                                content: "Operation cancelled by user.".to_string(),
                                is_error: true,
                            });
                            continue;
                        }
                        self.sink.emit(LoopEvent::ToolCall {
                            tool: name.clone(),
                            input: input.clone(),
                        });
                        let result = self.kernel.dispatch(name, input.clone()).await;
                        self.sink.emit(LoopEvent::ToolResult {
                            tool: name.clone(),
                            result: result.clone(),
                        });
                        let is_error = result.get("error").is_some();
                        let content = truncate_json(&result, self.tool_result_truncate_chars);
                        tool_results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content,
                            is_error,
                        });
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }

            self.messages.push(Message::user_blocks(tool_results));

            if self.cancel.is_cancelled() {
                return Err(BastionError::CancelledByUser);
            }
        }

        tracing::warn!("max_tool_iterations_reached");
        self.sink.emit(LoopEvent::Error(format!(
            "Safety stop: reached the maximum of {} tool-call iterations for this turn",
            self.max_tool_iterations
        )));
        Ok(())
    }
}

async fn read_stdin_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        use std::io::BufRead;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end().to_string()),
            Err(_) => None,
        }
    })
    .await
    .unwrap_or(None)
}

/// Truncate a JSON value's serialized form to at most `max_chars`,
/// preserving head and tail halves around a marker. Solely an input-budget
/// control for the LLM collaborator — unrelated to the audit log's own
/// field truncation in `AuditLog`.
pub fn truncate_json(value: &Value, max_chars: usize) -> String {
    let text = value.to_string();
    if text.len() <= max_chars {
        return text;
    }
    let total = text.len();
    let marker_budget = max_chars.saturating_sub(30).max(2);
    let half = marker_budget / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().rev().take(half).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{head}... ({} chars truncated) ...{tail}", total - 2 * half)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::ApprovalMode;
    use crate::dispatch::DispatchKernel;
    use crate::inventory::Inventory;
    use async_trait::async_trait;
    use bastion_core::{AssistantTurn, LLMError, Tool};
    use serde_json::json;

    struct ScriptedProvider {
        turns: std::sync::Mutex<Vec<AssistantTurn>>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(&self, _messages: &[Message], _tools: &[Tool]) -> Result<AssistantTurn, LLMError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Ok(AssistantTurn {
                    content: vec![ContentBlock::text("done")],
                    stop_reason: StopReason::EndTurn,
                });
            }
            Ok(turns.remove(0))
        }
    }

    async fn empty_kernel() -> (Arc<DispatchKernel>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(&dir.path().join("audit.jsonl"), 2000).await.unwrap());
        let kernel = DispatchKernel::new(
            Arc::new(Inventory::default()),
            audit,
            ExecutionConfig::default(),
            ApprovalMode::AutoDeny,
        );
        (Arc::new(kernel), dir)
    }

    #[tokio::test]
    async fn simple_turn_ends_and_renders_text() {
        let (kernel, _dir) = empty_kernel().await;
        let provider = Arc::new(ScriptedProvider {
            turns: std::sync::Mutex::new(vec![]),
        });
        let sink = Arc::new(crate::events::NullSink);
        let mut loop_ = ConversationLoop::new(provider, kernel, sink, &ExecutionConfig::default());
        loop_.process_message("hello").await.unwrap();
        assert_eq!(loop_.get_messages().len(), 2);
        assert_eq!(loop_.get_messages()[0].role, ChatRole::User);
        assert_eq!(loop_.get_messages()[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn restore_then_process_keeps_alternation() {
        let (kernel, _dir) = empty_kernel().await;
        let provider = Arc::new(ScriptedProvider {
            turns: std::sync::Mutex::new(vec![]),
        });
        let sink = Arc::new(crate::events::NullSink);
        let mut loop_ = ConversationLoop::new(provider, kernel, sink, &ExecutionConfig::default());
        loop_.restore_messages(vec![
            Message::user_text("prior"),
            Message::assistant_blocks(vec![ContentBlock::text("ack")]),
        ]);
        loop_.process_message("again").await.unwrap();
        let messages = loop_.get_messages();
        assert_eq!(messages.len(), 4);
        for (i, m) in messages.iter().enumerate() {
            let expected = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            assert_eq!(m.role, expected);
        }
    }

    #[tokio::test]
    async fn cancel_before_iteration_raises_cancelled() {
        let (kernel, _dir) = empty_kernel().await;
        let provider = Arc::new(ScriptedProvider {
            turns: std::sync::Mutex::new(vec![]),
        });
        let sink = Arc::new(crate::events::NullSink);
        let mut loop_ = ConversationLoop::new(provider, kernel, sink, &ExecutionConfig::default());
        loop_.cancel_token().cancel();
        let err = loop_.process_message("hi").await.unwrap_err();
        assert!(matches!(err, BastionError::CancelledByUser));
    }

    #[test]
    fn truncate_json_preserves_head_and_tail() {
        let value = json!({"output": "x".repeat(5000)});
        let truncated = truncate_json(&value, 200);
        assert!(truncated.len() < value.to_string().len());
        assert!(truncated.contains("chars truncated"));
        assert!(truncated.starts_with("{\"output\":\"x"));
    }

    #[test]
    fn truncate_json_is_noop_under_budget() {
        let value = json!({"output": "hi"});
        assert_eq!(truncate_json(&value, 3000), value.to_string());
    }
}
