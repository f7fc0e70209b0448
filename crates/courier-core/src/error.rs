//! The error taxonomy shared by every bridge component.
//!
//! Each error a caller can observe maps into one [`ErrorKind`]; the kind is
//! what travels on the wire. [`CoreError`] is the internal carrier with
//! enough context for logs and for the dispatcher's retry decisions.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Wire-visible error classification.
///
/// The serialized names match the control-channel contract
/// (`"ValidationError"`, `"AuthError"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or unknown operation or arguments. Never retried.
    ValidationError,
    /// Session not authenticated, or an auth step was rejected.
    AuthError,
    /// Blocked by deployment policy. Never retried.
    PermissionDenied,
    /// Admission refused or backend flood signal; caller may retry after the
    /// indicated interval.
    RateLimited,
    /// Backend call failed after retries were exhausted.
    UpstreamError,
    /// The request exceeded its configured bound.
    Timeout,
    /// Invariant violation. Always surfaced, never swallowed.
    Internal,
}

/// Error carrier used across the bridge crates.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Unknown operation name.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// The operation that was not found in the registry.
        name: String,
    },

    /// Arguments did not match the declared schema.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Why validation failed.
        reason: String,
    },

    /// A request id was reused within the session lifetime.
    #[error("duplicate request id: {id}")]
    DuplicateRequestId {
        /// The reused id.
        id: String,
    },

    /// The session is not in the `Authenticated` state.
    #[error("session not authenticated: {reason}")]
    NotAuthenticated {
        /// Current state or rejection detail.
        reason: String,
    },

    /// An authentication step was rejected by the backend.
    #[error("authentication failed: {reason}")]
    AuthRejected {
        /// Rejection detail.
        reason: String,
    },

    /// Deployment policy denied the operation.
    #[error("operation denied by policy: {reason}")]
    PolicyDenied {
        /// Why the guard said no.
        reason: String,
    },

    /// The user declined a confirmation request.
    #[error("confirmation declined for request {id}")]
    ConfirmationDeclined {
        /// The declined request id.
        id: String,
    },

    /// Admission control refused the request.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Admission or flood detail.
        reason: String,
        /// Suggested wait before retrying, when known.
        retry_after: Option<Duration>,
    },

    /// The backend call failed after the retry budget was spent.
    #[error("upstream failure: {reason}")]
    Upstream {
        /// Final backend failure detail.
        reason: String,
    },

    /// The request exceeded its configured bound.
    #[error("request timed out after {}s", timeout.as_secs())]
    Timeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The request was cancelled before a response was produced.
    #[error("request cancelled")]
    Cancelled,

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The wire-visible classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation { .. }
            | Self::InvalidArguments { .. }
            | Self::DuplicateRequestId { .. } => ErrorKind::ValidationError,
            Self::NotAuthenticated { .. } | Self::AuthRejected { .. } => ErrorKind::AuthError,
            Self::PolicyDenied { .. } | Self::ConfirmationDeclined { .. } => {
                ErrorKind::PermissionDenied
            },
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            // Cancellation is caller-initiated; it surfaces as a timeout-class
            // terminal response rather than an internal fault.
            Self::Cancelled => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Suggested wait before retrying, if this error carries one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for bridge operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CoreError::UnknownOperation {
                name: "x".to_string()
            }
            .kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            CoreError::NotAuthenticated {
                reason: "unauthenticated".to_string()
            }
            .kind(),
            ErrorKind::AuthError
        );
        assert_eq!(
            CoreError::PolicyDenied {
                reason: "blocked".to_string()
            }
            .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            CoreError::Timeout {
                timeout: Duration::from_secs(30)
            }
            .kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_retry_after_carried() {
        let err = CoreError::RateLimited {
            reason: "flood".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert!(CoreError::Cancelled.retry_after().is_none());
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::AuthError).unwrap(),
            "\"AuthError\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimited).unwrap(),
            "\"RateLimited\""
        );
    }

    #[test]
    fn test_display() {
        let err = CoreError::Timeout {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "request timed out after 30s");
    }
}
