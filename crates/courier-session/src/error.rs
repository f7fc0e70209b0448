//! Session error types.

use thiserror::Error;

use courier_core::{BackendError, CoreError};

use crate::state::AuthState;

/// Errors raised by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation needed an authenticated session.
    #[error("not authenticated (state: {state})")]
    NotAuthenticated {
        /// State the session was in.
        state: AuthState,
    },

    /// The requested step does not apply in the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// State the session was in.
        state: AuthState,
        /// The attempted step.
        action: &'static str,
    },

    /// The backend rejected the credentials.
    #[error("sign-in rejected: {reason}")]
    Rejected {
        /// Backend-provided reason.
        reason: String,
    },

    /// Too many consecutive failed sign-in attempts; the flow was revoked.
    #[error("sign-in revoked after {attempts} failed attempts")]
    TooManyAttempts {
        /// How many attempts were made.
        attempts: u32,
    },

    /// The backend failed for a non-credential reason.
    #[error("backend error during sign-in: {0}")]
    Backend(#[from] BackendError),

    /// The persisted blob could not be read or written.
    #[error("session store {action} failed for {path}: {source}")]
    Store {
        /// What was attempted.
        action: &'static str,
        /// File involved.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted blob is not valid base64.
    #[error("persisted session blob is corrupt: {0}")]
    CorruptBlob(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for CoreError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotAuthenticated { state } => CoreError::NotAuthenticated {
                reason: format!("session state is {state}"),
            },
            SessionError::InvalidTransition { .. } | SessionError::TooManyAttempts { .. } => {
                CoreError::AuthRejected {
                    reason: err.to_string(),
                }
            },
            SessionError::Rejected { reason } => CoreError::AuthRejected { reason },
            SessionError::Backend(backend) => match backend {
                BackendError::Auth(reason) => CoreError::AuthRejected { reason },
                BackendError::Flood { retry_after } => CoreError::RateLimited {
                    reason: "backend flood wait during sign-in".to_string(),
                    retry_after: Some(retry_after),
                },
                other => CoreError::Upstream {
                    reason: other.to_string(),
                },
            },
            SessionError::Store { .. } | SessionError::CorruptBlob(_) => {
                CoreError::Internal(err.to_string())
            },
        }
    }
}
