//! HTTP-facing error type.
//!
//! Domain errors are mapped to a status code and a JSON body of the form
//! `{"success": false, "error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parlance_conversation::{StoreError, TurnError};
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A turn or session operation failed.
    Turn(TurnError),
    /// The session identifier in the path or body is malformed.
    InvalidSessionId { reason: String },
    /// The session directory failed.
    Store(StoreError),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Turn(TurnError::InvalidInput { .. }) | Self::InvalidSessionId { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Turn(TurnError::TurnInProgress { .. }) => StatusCode::CONFLICT,
            Self::Turn(TurnError::Provider { .. }) => StatusCode::BAD_GATEWAY,
            Self::Turn(TurnError::SessionClosed { .. }) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Turn(e) => write!(f, "{e}"),
            Self::InvalidSessionId { reason } => write!(f, "invalid session id: {reason}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Report<TurnError>> for ApiError {
    fn from(report: Report<TurnError>) -> Self {
        Self::Turn(report.current_context().clone())
    }
}

impl From<Report<StoreError>> for ApiError {
    fn from(report: Report<StoreError>) -> Self {
        Self::Store(report.current_context().clone())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}
