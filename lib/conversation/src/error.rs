//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `TurnError`: what a caller of a turn can observe
//! - `ToolError`: faults inside a tool, converted to data at the registry
//! - `StoreError`: faults from external stores (chat log, catalog, documents)

use parlance_core::SessionId;
use std::fmt;

/// Errors surfaced by a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// The user message was empty or whitespace-only. No side effects.
    InvalidInput { reason: String },
    /// A turn is already running for this session. No side effects.
    TurnInProgress { session_id: SessionId },
    /// The completion provider failed. The session still committed a
    /// fallback assistant message and is idle again.
    Provider { reason: String },
    /// The session actor is no longer running.
    SessionClosed { session_id: SessionId },
}

impl TurnError {
    /// Returns true if the request was rejected before anything changed.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::TurnInProgress { .. })
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid message: {reason}"),
            Self::TurnInProgress { session_id } => {
                write!(f, "a turn is already in progress for session {session_id}")
            }
            Self::Provider { reason } => write!(f, "completion provider failed: {reason}"),
            Self::SessionClosed { session_id } => write!(f, "session {session_id} is closed"),
        }
    }
}

impl std::error::Error for TurnError {}

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Invalid tool input.
    InvalidInput { name: String, reason: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Tool did not finish in time.
    Timeout { name: String, after_secs: u64 },
    /// Tool panicked.
    Panicked { name: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
            Self::ExecutionFailed { name, reason } => {
                write!(f, "Failed to execute {name}: {reason}")
            }
            Self::Timeout { name, after_secs } => {
                write!(f, "tool '{name}' timed out after {after_secs}s")
            }
            Self::Panicked { name } => write!(f, "tool '{name}' panicked"),
        }
    }
}

impl std::error::Error for ToolError {}

/// Errors from external stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is not reachable.
    Unavailable { store: &'static str, reason: String },
    /// An operation against the store failed.
    OperationFailed { store: &'static str, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { store, reason } => write!(f, "{store} unavailable: {reason}"),
            Self::OperationFailed { store, reason } => {
                write!(f, "{store} operation failed: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
