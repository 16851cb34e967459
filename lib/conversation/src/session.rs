//! Conversation session state.
//!
//! A `Session` is owned by exactly one [`SessionActor`](crate::SessionActor),
//! which is the only code path that mutates it. Everything else sees clones.

use crate::error::TurnError;
use crate::message::Message;
use chrono::Duration;
use parlance_core::SessionId;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No turn is running.
    Idle,
    /// A turn is running.
    Processing,
    /// A turn is running and the streaming buffer is growing.
    Streaming,
}

impl SessionPhase {
    /// Returns true while a turn is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing | Self::Streaming)
    }
}

/// State of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier.
    pub session_id: SessionId,
    /// Model used for the next turn.
    pub model: String,
    /// Committed history, in conversation order.
    pub messages: Vec<Message>,
    /// Text streamed so far in the current turn.
    pub streaming_message: String,
    /// True while a turn is in flight.
    pub is_processing: bool,
    /// Finer-grained view of `is_processing`.
    pub phase: SessionPhase,
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new(session_id: SessionId, model: impl Into<String>) -> Self {
        Self {
            session_id,
            model: model.into(),
            messages: Vec::new(),
            streaming_message: String::new(),
            is_processing: false,
            phase: SessionPhase::Idle,
        }
    }

    /// Marks a turn as started.
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` if a turn is already running; nothing changes.
    pub fn begin_turn(&mut self, model: Option<&str>) -> Result<(), TurnError> {
        if self.is_processing {
            return Err(TurnError::TurnInProgress {
                session_id: self.session_id.clone(),
            });
        }
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.model = model.to_string();
        }
        self.streaming_message.clear();
        self.is_processing = true;
        self.phase = SessionPhase::Processing;
        Ok(())
    }

    /// Appends streamed text to the buffer. Ignored outside a turn.
    pub fn append_stream_chunk(&mut self, chunk: &str) {
        if !self.is_processing {
            return;
        }
        self.phase = SessionPhase::Streaming;
        self.streaming_message.push_str(chunk);
    }

    /// Appends the user/assistant pair and returns the session to idle.
    ///
    /// Timestamps are nudged forward where needed so history timestamps are
    /// strictly increasing.
    pub fn commit_turn(&mut self, user: Message, assistant: Message) {
        let user = self.stamped(user);
        self.messages.push(user);
        let assistant = self.stamped(assistant);
        self.messages.push(assistant);

        self.streaming_message.clear();
        self.is_processing = false;
        self.phase = SessionPhase::Idle;
    }

    fn stamped(&self, mut message: Message) -> Message {
        if let Some(last) = self.messages.last() {
            if message.timestamp <= last.timestamp {
                message.timestamp = last.timestamp + Duration::microseconds(1);
            }
        }
        message
    }

    /// Drops the history.
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` while a turn is running.
    pub fn clear(&mut self) -> Result<(), TurnError> {
        if self.is_processing {
            return Err(TurnError::TurnInProgress {
                session_id: self.session_id.clone(),
            });
        }
        self.messages.clear();
        self.streaming_message.clear();
        Ok(())
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
