//! Message types for conversations.

use chrono::{DateTime, Utc};
use parlance_core::MessageId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// System message.
    System,
    /// Tool result message.
    Tool,
}

impl MessageRole {
    /// Storage representation, matching the serde form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }

    /// Returns true for roles that are replayed into the model context.
    #[must_use]
    pub fn is_conversational(&self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }
}

/// A committed message in a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Tools that ran to produce this message, in call order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    /// Creates a new message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attaches the executed tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Returns true if this message has tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Result of a tool invocation: a success payload or `{"error": reason}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    /// The tool failed; the reason is visible to the model.
    Error { error: String },
    /// The tool succeeded with this payload.
    Success(JsonValue),
}

impl ToolOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(payload: JsonValue) -> Self {
        Self::Success(payload)
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Classifies a tool's payload. A bare `{"error": "..."}` object is a
    /// domain-level failure reported by the tool itself.
    #[must_use]
    pub fn from_payload(payload: JsonValue) -> Self {
        match &payload {
            JsonValue::Object(map) if map.len() == 1 => match map.get("error") {
                Some(JsonValue::String(error)) => Self::failure(error.clone()),
                _ => Self::Success(payload),
            },
            _ => Self::Success(payload),
        }
    }

    /// Returns true if the tool call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the error reason, if the tool failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// Serializes the outcome as the content of a tool-result context entry.
    #[must_use]
    pub fn to_context_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

/// A tool call made during a turn, with its result attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the provider or synthesized.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Map<String, JsonValue>,
    /// What the tool returned.
    pub result: ToolOutcome,
}

impl ToolCall {
    /// Creates a tool call record.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, JsonValue>,
        result: ToolOutcome,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result,
        }
    }
}
