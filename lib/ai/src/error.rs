//! Error types for the completion client.
//!
//! `CompletionError` is the context at the top of every report returned by a
//! [`CompletionClient`](crate::CompletionClient). The conversation layer maps
//! all of its variants onto a single provider failure.

use std::fmt;

/// Errors from chat-completion provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Provider could not be reached.
    ProviderUnavailable { provider: String, reason: String },
    /// Request was rejected or failed in transit.
    RequestFailed { reason: String },
    /// Response body could not be understood.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for the provider.
    Timeout { after_secs: u64 },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// A delta stream ended with an error before its terminator.
    StreamInterrupted { reason: String },
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "completion provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "completion request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse completion response: {reason}")
            }
            Self::Timeout { after_secs } => {
                write!(f, "completion request timed out after {after_secs}s")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::StreamInterrupted { reason } => {
                write!(f, "completion stream interrupted: {reason}")
            }
        }
    }
}

impl std::error::Error for CompletionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_display() {
        let err = CompletionError::ProviderUnavailable {
            provider: "gateway".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("gateway"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn rate_limited_display() {
        let err = CompletionError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 30s");
        let err = CompletionError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn timeout_display() {
        let err = CompletionError::Timeout { after_secs: 60 };
        assert!(err.to_string().contains("60s"));
    }
}
