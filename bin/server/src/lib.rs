//! parlance HTTP server.
//!
//! This crate provides the axum surface over the conversation engine, plus
//! the PostgreSQL and NATS implementations of its external stores.

pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod hub;
pub mod routes;

#[cfg(test)]
mod testing;
