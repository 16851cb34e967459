//! Units of streamed completion output.

use serde::{Deserialize, Serialize};

/// One unit of a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Text appended verbatim to the growing assistant content.
    Text { text: String },
    /// A fragment of a tool call.
    ToolCall(ToolCallDelta),
}

impl Delta {
    /// Creates a text delta.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A fragment of a tool call, keyed by `index`.
///
/// Fragments with the same index belong to the same call. `id` and `name` are
/// normally only present on the first fragment; `arguments` is a piece of a
/// JSON document that is only complete once the stream has ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call within the assistant turn.
    pub index: usize,
    /// Provider-assigned call identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument string fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    /// Creates an empty fragment for `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Sets the call identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the tool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the argument fragment.
    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

impl From<ToolCallDelta> for Delta {
    fn from(delta: ToolCallDelta) -> Self {
        Self::ToolCall(delta)
    }
}
