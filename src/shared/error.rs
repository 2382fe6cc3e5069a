//! Application Error Types
//!
//! Session error taxonomy and its Axum mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::{BusError, CoordinatorError};

/// Errors returned by listener/stream/session-manager operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is already active")]
    AlreadyActive,

    #[error("Listener session is not active")]
    ListenerNotActive,

    #[error("No root room id could be resolved from the configuration")]
    MissingRoomId,

    #[error("Trial validation rejected: {message}")]
    TrialRejected {
        message: String,
        blocked_ids: Vec<String>,
        reason: Option<String>,
    },

    #[error("Coordinator did not start the session (status: {status})")]
    RemoteSessionRejected { status: String },

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    MessageBus(#[from] BusError),
}

impl SessionError {
    /// Precondition violations the caller can fix by changing session state.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SessionError::AlreadyActive | SessionError::ListenerNotActive | SessionError::MissingRoomId
        )
    }
}

/// Error returned by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorResponse {
    fn new(code: u16, message: String) -> Self {
        Self {
            code,
            message,
            blocked_ids: None,
            reason: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Session(err) => session_error_response(err),
        };

        (status, Json(body)).into_response()
    }
}

fn session_error_response(err: SessionError) -> (StatusCode, ErrorResponse) {
    match err {
        SessionError::AlreadyActive | SessionError::ListenerNotActive => {
            let message = err.to_string();
            (StatusCode::CONFLICT, ErrorResponse::new(21001, message))
        }
        SessionError::MissingRoomId => {
            (StatusCode::BAD_REQUEST, ErrorResponse::new(21002, err.to_string()))
        }
        SessionError::TrialRejected {
            message,
            blocked_ids,
            reason,
        } => (
            StatusCode::FORBIDDEN,
            ErrorResponse {
                code: 21003,
                message,
                blocked_ids: Some(blocked_ids),
                reason,
            },
        ),
        SessionError::RemoteSessionRejected { .. } | SessionError::Coordinator(_) => {
            tracing::warn!(error = %err, "Coordinator failure surfaced to caller");
            (StatusCode::BAD_GATEWAY, ErrorResponse::new(21004, err.to_string()))
        }
        SessionError::MessageBus(_) => {
            tracing::warn!(error = %err, "Message bus failure surfaced to caller");
            (StatusCode::BAD_GATEWAY, ErrorResponse::new(21005, err.to_string()))
        }
    }
}
