//! Durable, append-only chat log.
//!
//! The log is an external store. Each append keeps only the most recent
//! [`LOG_RETENTION_PER_SESSION`] entries for that session.

use crate::error::StoreError;
use crate::message::{Message, MessageRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parlance_core::SessionId;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Entries retained per session after every write.
pub const LOG_RETENTION_PER_SESSION: usize = 20;

/// One row of the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Owning session.
    pub session_id: SessionId,
    /// Optional external sender (e.g. a messaging-platform user).
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// Message creation time.
    pub timestamp: DateTime<Utc>,
    /// Tool-call records, if any.
    #[serde(default)]
    pub tool_calls: Option<JsonValue>,
}

impl LogEntry {
    /// Creates a log entry for a committed message.
    #[must_use]
    pub fn from_message(session_id: &SessionId, message: &Message) -> Self {
        let tool_calls = message
            .has_tool_calls()
            .then(|| serde_json::to_value(&message.tool_calls).ok())
            .flatten();
        Self {
            session_id: session_id.clone(),
            sender_id: None,
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp,
            tool_calls,
        }
    }
}

/// Append-only store of conversation turns.
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Appends an entry, then prunes the session to the retention limit.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the write fails.
    async fn append(&self, entry: LogEntry) -> Result<(), Report<StoreError>>;
}

/// In-process chat log.
#[derive(Debug, Default)]
pub struct InMemoryChatLog {
    entries: Mutex<HashMap<SessionId, Vec<LogEntry>>>,
}

impl InMemoryChatLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the retained entries for a session, oldest first.
    pub async fn entries(&self, session_id: &SessionId) -> Vec<LogEntry> {
        self.entries
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatLog for InMemoryChatLog {
    async fn append(&self, entry: LogEntry) -> Result<(), Report<StoreError>> {
        let mut entries = self.entries.lock().await;
        let rows = entries.entry(entry.session_id.clone()).or_default();
        rows.push(entry);
        rows.sort_by_key(|row| row.timestamp);
        let excess = rows.len().saturating_sub(LOG_RETENTION_PER_SESSION);
        rows.drain(..excess);
        Ok(())
    }
}
