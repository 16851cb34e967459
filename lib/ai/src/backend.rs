//! Completion client abstraction.
//!
//! Requests and messages follow the OpenAI chat-completions wire format, which
//! is what every supported gateway speaks. The orchestrator only ever talks to
//! the [`CompletionClient`] trait, so tests can substitute a scripted client.

use crate::delta::Delta;
use crate::error::CompletionError;
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// The role of a message sender, as seen by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instruction.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// Tool result message.
    Tool,
}

/// A message in the provider context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,
    /// Text content. `None` for an assistant turn that only requests tools.
    pub content: Option<String>,
    /// Tool calls requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// The tool call a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    /// Creates an assistant turn that echoes a tool-call request.
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Creates a tool result entry for the given call.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

fn function_kind() -> String {
    "function".to_string()
}

/// A tool call as requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier assigned by the provider (or synthesized).
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    /// The function invocation.
    pub function: FunctionCall,
}

impl ToolCallRequest {
    /// Creates a function tool call.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Name and raw argument string of a requested function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function (tool) name.
    pub name: String,
    /// JSON-encoded arguments, exactly as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

/// A tool declaration sent with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Always `"function"`.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    /// The function description.
    pub function: FunctionSpec,
}

/// Function part of a [`ToolSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: JsonValue,
}

impl ToolSpec {
    /// Creates a function tool declaration.
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: JsonValue,
    ) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Tool-choice policy. Only automatic selection is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    Auto,
}

/// A chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered context.
    pub messages: Vec<ChatMessage>,
    /// Declared tool catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    /// Tool-choice policy; present whenever tools are declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether a delta stream is requested. Set by the client.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl CompletionRequest {
    /// Creates a request without tools.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
        }
    }

    /// Declares the tool catalog with automatic tool choice.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tool_choice = (!tools.is_empty()).then_some(ToolChoice::Auto);
        self.tools = tools;
        self
    }
}

/// The assistant message returned by a blocking completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    /// Text content, if any.
    #[serde(default)]
    pub content: Option<String>,
    /// Requested tool calls, if any.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl CompletionMessage {
    /// Returns true if the model requested at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Returns the content if it is present and non-empty.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// A finite, single-pass sequence of deltas.
///
/// The sender side is dropped after the last delta; `recv()` returning `None`
/// is the end-of-stream signal. An `Err` item terminates the stream.
pub type DeltaStream = mpsc::Receiver<Result<Delta, CompletionError>>;

/// Trait for chat-completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Performs a single blocking completion.
    ///
    /// Returns `Ok(None)` when the provider answered without a usable message.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Option<CompletionMessage>, Report<CompletionError>>;

    /// Opens a streaming completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened. Failures after the
    /// stream is open arrive as `Err` items on the stream.
    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream, Report<CompletionError>>;
}
