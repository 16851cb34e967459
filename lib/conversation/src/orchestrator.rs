//! Turn orchestration.
//!
//! [`ConversationOrchestrator::process_turn`] turns one user message into one
//! assistant message: windowed context, completion (streamed or blocking),
//! tool execution, follow-up completion. It never mutates a session; the
//! [`SessionActor`](crate::SessionActor) commits the returned pair.

use crate::context::build_context;
use crate::error::TurnError;
use crate::log::{ChatLog, LogEntry};
use crate::message::{Message, ToolCall};
use crate::stream::{TextFanout, ToolCallAccumulator};
use crate::tool::{PendingToolCall, ToolRegistry};
use parlance_ai::{
    ChatMessage, CompletionClient, CompletionError, CompletionRequest, Delta, ToolCallRequest,
};
use parlance_core::SessionId;
use rootcause::Report;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Reply when the provider answered without a message.
pub const NO_MESSAGE_FALLBACK: &str =
    "I apologize, but I encountered an issue processing your request.";
/// Reply when the provider's message had neither content nor tool calls.
pub const EMPTY_REPLY_FALLBACK: &str = "I apologize, but I encountered an issue.";
/// Reply when the follow-up completion after tool calls had no content.
pub const TOOL_FOLLOW_UP_FALLBACK: &str = "Tool results processed successfully.";
/// Reply committed (and streamed) when the provider fails.
pub const PROVIDER_ERROR_REPLY: &str = "Sorry, I encountered an error.";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer in the language the \
    user writes in unless asked otherwise. Use the available tools to look up weather, search \
    the web, look up products and fetch uploaded documents when they help answer the question. \
    Keep the context of the recent conversation so the dialogue stays coherent.";

/// Orchestrator settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Fixed system instruction at the head of every context.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Model assigned to new sessions.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Bound on each provider call, and on the gap between stream deltas.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Bound on each tool call.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Tool calls of one turn that may run at the same time.
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_model() -> String {
    "google-ai-studio/gemini-2.5-flash".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_tools() -> usize {
    4
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            default_model: default_model(),
            provider_timeout_secs: default_provider_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

/// Rejects blank user messages.
///
/// # Errors
///
/// Returns `InvalidInput` if `text` is empty or whitespace-only.
pub fn validate_message(text: &str) -> Result<(), TurnError> {
    if text.trim().is_empty() {
        return Err(TurnError::InvalidInput {
            reason: "message must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Everything a turn reads from the session, captured when the turn starts.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Model to use.
    pub model: String,
    /// History snapshot.
    pub history: Vec<Message>,
    /// The new user message.
    pub user_text: String,
}

/// The message pair produced by a turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The new user message.
    pub user_message: Message,
    /// The new assistant message. Fallback content if the provider failed.
    pub assistant_message: Message,
    /// Why the provider failed, if it did.
    pub provider_error: Option<String>,
}

impl TurnOutcome {
    /// Outcome of a turn that could not produce a reply at all.
    #[must_use]
    pub fn failed(user_text: &str, reason: impl Into<String>) -> Self {
        Self {
            user_message: Message::user(user_text),
            assistant_message: Message::assistant(PROVIDER_ERROR_REPLY),
            provider_error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Default)]
struct Draft {
    content: String,
    tool_calls: Vec<ToolCall>,
}

/// Drives one turn against a completion provider and a tool registry.
pub struct ConversationOrchestrator {
    client: Arc<dyn CompletionClient>,
    tools: ToolRegistry,
    chat_log: Option<Arc<dyn ChatLog>>,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    /// Creates an orchestrator. The registry's per-call timeout is set from
    /// the configuration.
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: ToolRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        let tools = tools.with_timeout(Duration::from_secs(config.tool_timeout_secs));
        Self {
            client,
            tools,
            chat_log: None,
            config,
        }
    }

    /// Persists committed turns to this log.
    #[must_use]
    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs one turn.
    ///
    /// With a `fanout`, the completion is streamed and every text chunk is
    /// emitted as it arrives; the emitted chunks concatenate to the final
    /// content. A provider failure is not an error here: the outcome carries
    /// fallback content and `provider_error`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank message, before any provider call.
    #[instrument(skip(self, input, fanout), fields(session_id = %input.session_id, model = %input.model, streaming = fanout.is_some()))]
    pub async fn process_turn(
        &self,
        input: TurnInput,
        fanout: Option<&TextFanout>,
    ) -> Result<TurnOutcome, TurnError> {
        validate_message(&input.user_text)?;

        let user_message = Message::user(&input.user_text);
        let context = build_context(&self.config.system_prompt, &input.history, &input.user_text);
        let mut draft = Draft::default();

        let result = match fanout {
            Some(fanout) => self.stream_turn(&input.model, context, fanout, &mut draft).await,
            None => self.blocking_turn(&input.model, context, &mut draft).await,
        };

        let provider_error = match result {
            Ok(()) => None,
            Err(report) => {
                warn!(error = %report, "completion failed, committing fallback reply");
                if let Some(fanout) = fanout {
                    fanout.emit(PROVIDER_ERROR_REPLY);
                }
                draft.content = PROVIDER_ERROR_REPLY.to_string();
                Some(report.current_context().to_string())
            }
        };

        info!(
            tool_calls = draft.tool_calls.len(),
            failed = provider_error.is_some(),
            "turn complete"
        );

        Ok(TurnOutcome {
            user_message,
            assistant_message: Message::assistant(draft.content).with_tool_calls(draft.tool_calls),
            provider_error,
        })
    }

    fn provider_timeout(&self) -> CompletionError {
        CompletionError::Timeout {
            after_secs: self.config.provider_timeout_secs,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, Report<CompletionError>>>,
    ) -> Result<T, Report<CompletionError>> {
        let limit = Duration::from_secs(self.config.provider_timeout_secs);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(self.provider_timeout().into()),
        }
    }

    async fn stream_turn(
        &self,
        model: &str,
        context: Vec<ChatMessage>,
        fanout: &TextFanout,
        draft: &mut Draft,
    ) -> Result<(), Report<CompletionError>> {
        let request =
            CompletionRequest::new(model, context.clone()).with_tools(self.tools.to_specs());
        let mut stream = self.bounded(self.client.stream_complete(&request)).await?;

        let mut streamed = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        loop {
            let limit = Duration::from_secs(self.config.provider_timeout_secs);
            let next = tokio::time::timeout(limit, stream.recv())
                .await
                .map_err(|_| self.provider_timeout())?;
            match next {
                None => break,
                Some(Ok(Delta::Text { text })) => {
                    streamed.push_str(&text);
                    fanout.emit(&text);
                }
                Some(Ok(Delta::ToolCall(fragment))) => accumulator.push(fragment),
                Some(Err(e)) => return Err(e.into()),
            }
        }

        if accumulator.is_empty() {
            draft.content = streamed;
            return Ok(());
        }

        let requests = accumulator.finish();
        debug!(calls = requests.len(), "stream requested tools");
        draft.tool_calls = self.run_tools(&requests).await;
        let content = self
            .follow_up(model, context, requests, &draft.tool_calls)
            .await?;

        // Only the part of the final content the caller has not seen yet.
        let trailing = content.strip_prefix(streamed.as_str()).unwrap_or(&content);
        fanout.emit(trailing);
        draft.content = content;
        Ok(())
    }

    async fn blocking_turn(
        &self,
        model: &str,
        context: Vec<ChatMessage>,
        draft: &mut Draft,
    ) -> Result<(), Report<CompletionError>> {
        let request =
            CompletionRequest::new(model, context.clone()).with_tools(self.tools.to_specs());
        let Some(reply) = self.bounded(self.client.complete(&request)).await? else {
            draft.content = NO_MESSAGE_FALLBACK.to_string();
            return Ok(());
        };

        if !reply.has_tool_calls() {
            draft.content = reply.text().unwrap_or(EMPTY_REPLY_FALLBACK).to_string();
            return Ok(());
        }

        debug!(calls = reply.tool_calls.len(), "reply requested tools");
        draft.tool_calls = self.run_tools(&reply.tool_calls).await;
        draft.content = self
            .follow_up(model, context, reply.tool_calls, &draft.tool_calls)
            .await?;
        Ok(())
    }

    async fn run_tools(&self, requests: &[ToolCallRequest]) -> Vec<ToolCall> {
        let pending: Vec<PendingToolCall> = requests.iter().map(PendingToolCall::from).collect();
        self.tools
            .execute_all(pending, self.config.max_concurrent_tools)
            .await
    }

    /// Completion over the prior context, the echoed tool-call request and
    /// one result entry per call, in call order. No tools are declared.
    async fn follow_up(
        &self,
        model: &str,
        mut context: Vec<ChatMessage>,
        requests: Vec<ToolCallRequest>,
        records: &[ToolCall],
    ) -> Result<String, Report<CompletionError>> {
        context.push(ChatMessage::assistant_tool_calls(requests));
        context.extend(
            records
                .iter()
                .map(|call| ChatMessage::tool_result(&call.id, call.result.to_context_string())),
        );

        let request = CompletionRequest::new(model, context);
        let reply = self.bounded(self.client.complete(&request)).await?;
        Ok(reply
            .as_ref()
            .and_then(|m| m.text())
            .unwrap_or(TOOL_FOLLOW_UP_FALLBACK)
            .to_string())
    }

    /// Appends committed messages to the chat log. Failures are logged only.
    #[instrument(skip(self, messages), fields(session_id = %session_id, count = messages.len()))]
    pub async fn persist_turn(&self, session_id: &SessionId, messages: &[Message]) {
        let Some(chat_log) = &self.chat_log else {
            return;
        };
        for message in messages {
            if let Err(report) = chat_log
                .append(LogEntry::from_message(session_id, message))
                .await
            {
                warn!(error = %report, message_id = %message.id, "failed to persist message");
            }
        }
    }
}
