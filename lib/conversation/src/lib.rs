//! Conversation engine for parlance.
//!
//! This crate provides:
//!
//! - **SessionActor**: single-writer owner of one session's state
//! - **ConversationOrchestrator**: turns one user message into one assistant
//!   message, streaming text and running tools along the way
//! - **Tool Registry**: tools available during conversation, plus the
//!   built-in catalog
//! - **Chat log and session directory**: contracts for the external stores

pub mod actor;
pub mod context;
pub mod directory;
pub mod error;
pub mod log;
pub mod message;
pub mod orchestrator;
pub mod session;
pub mod stream;
pub mod tool;
pub mod tools;

#[cfg(test)]
mod testing;

pub use actor::{SessionActor, TurnTicket};
pub use context::{CONTEXT_WINDOW, build_context};
pub use directory::{InMemorySessionDirectory, SessionDirectory, SessionInfo, session_title};
pub use error::{StoreError, ToolError, TurnError};
pub use log::{ChatLog, InMemoryChatLog, LOG_RETENTION_PER_SESSION, LogEntry};
pub use message::{Message, MessageRole, ToolCall, ToolOutcome};
pub use orchestrator::{
    ConversationOrchestrator, OrchestratorConfig, TurnInput, TurnOutcome, validate_message,
};
pub use session::{Session, SessionPhase};
pub use stream::{TextFanout, ToolCallAccumulator, parse_arguments};
pub use tool::{PendingToolCall, Tool, ToolDefinition, ToolRegistry};
pub use tools::BuiltinTools;
