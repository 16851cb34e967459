//! Chat-completion primitives for parlance.
//!
//! This crate provides:
//!
//! - **CompletionClient**: blocking and streaming completion over a message
//!   context with a declared tool catalog
//! - **Delta**: the unit of a streamed completion (text or tool-call fragment)
//! - **OpenAiCompatibleClient**: an HTTP implementation for OpenAI-style gateways

pub mod backend;
pub mod delta;
pub mod error;
pub mod openai;
pub mod sse;

pub use backend::{
    ChatMessage, ChatRole, CompletionClient, CompletionMessage, CompletionRequest, DeltaStream,
    FunctionCall, FunctionSpec, ToolCallRequest, ToolChoice, ToolSpec,
};
pub use delta::{Delta, ToolCallDelta};
pub use error::CompletionError;
pub use openai::{OpenAiCompatibleClient, ProviderConfig};
