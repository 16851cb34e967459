//! Core domain types for the parlance conversation engine.
//!
//! This crate provides the identifiers shared by the completion client, the
//! conversation engine and the server.

pub mod id;

pub use id::{MessageId, ParseIdError, SessionId};
