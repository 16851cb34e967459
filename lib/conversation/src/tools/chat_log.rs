//! `save_chat_message`: append one message to the chat log.

use crate::error::ToolError;
use crate::log::{ChatLog, LogEntry};
use crate::message::MessageRole;
use crate::tool::{Tool, ToolDefinition, str_arg};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parlance_core::SessionId;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::Arc;
use tracing::debug;

const NAME: &str = "save_chat_message";

fn invalid(reason: impl Into<String>) -> ToolError {
    ToolError::InvalidInput {
        name: NAME.to_string(),
        reason: reason.into(),
    }
}

/// Accepts epoch milliseconds or an RFC 3339 string.
fn parse_timestamp(value: Option<&JsonValue>) -> Result<DateTime<Utc>, ToolError> {
    match value {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| invalid("timestamp is out of range")),
        Some(JsonValue::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| invalid(format!("timestamp: {e}"))),
        _ => Err(invalid("timestamp is required")),
    }
}

/// Tool calls may arrive as a JSON value or as a JSON-encoded string.
fn parse_tool_calls(value: Option<&JsonValue>) -> Option<JsonValue> {
    match value? {
        JsonValue::Null => None,
        JsonValue::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

/// Chat-log persistence tool.
#[derive(Clone, Default)]
pub struct ChatLogTool {
    log: Option<Arc<dyn ChatLog>>,
}

impl ChatLogTool {
    /// Creates the tool. Without a log every save is a successful no-op.
    #[must_use]
    pub fn new(log: Option<Arc<dyn ChatLog>>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for ChatLogTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            NAME,
            "Save a message to the chat history. Internal tool, not meant for users.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "sender_id": { "type": "string" },
                "role": { "type": "string", "enum": ["user", "assistant"] },
                "content": { "type": "string" },
                "timestamp": { "type": "number" },
                "tool_calls": { "type": "string" }
            },
            "required": ["session_id", "role", "content", "timestamp"]
        }))
    }

    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        let Some(log) = &self.log else {
            debug!("no chat log configured, skipping persistence");
            return Ok(json!({ "success": true }));
        };

        let session_id: SessionId = str_arg(&arguments, "session_id")
            .ok_or_else(|| invalid("session_id is required"))?
            .parse()
            .map_err(|e| invalid(format!("session_id: {e}")))?;
        let role = match str_arg(&arguments, "role") {
            Some("user") => MessageRole::User,
            Some("assistant") => MessageRole::Assistant,
            _ => return Err(invalid("role must be \"user\" or \"assistant\"")),
        };
        let content = arguments
            .get("content")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| invalid("content is required"))?
            .to_string();

        let entry = LogEntry {
            session_id,
            sender_id: str_arg(&arguments, "sender_id").map(str::to_string),
            role,
            content,
            timestamp: parse_timestamp(arguments.get("timestamp"))?,
            tool_calls: parse_tool_calls(arguments.get("tool_calls")),
        };

        log.append(entry)
            .await
            .map_err(|report| ToolError::ExecutionFailed {
                name: NAME.to_string(),
                reason: report.current_context().to_string(),
            })?;

        Ok(json!({ "success": true }))
    }
}
