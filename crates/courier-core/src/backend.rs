//! The backend adapter contract.
//!
//! The adapter is the external collaborator that speaks the messaging
//! platform's wire protocol. The bridge core never sees connection framing;
//! it sees named bindings, JSON arguments, and a [`BackendError`] it can
//! classify into the error taxonomy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::envelope::JsonMap;

/// Opaque persisted session state, produced and consumed only by the backend
/// adapter. Treated as a secret: `Debug` never prints the contents.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionBlob(Vec<u8>);

impl SessionBlob {
    /// Wrap raw blob bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode for storage.
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    /// Decode from the storage form.
    ///
    /// # Errors
    ///
    /// Returns a decode error if `encoded` is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(Self)
    }
}

impl fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBlob")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Outcome of submitting a verification code.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    /// Sign-in completed; the blob must be persisted.
    Complete(SessionBlob),
    /// The backend demands a second factor before completing sign-in.
    SecondFactorRequired,
}

/// Failure reported by the backend adapter.
///
/// The dispatcher classifies these into the wire taxonomy: `Auth` becomes
/// `AuthError`, `Flood` becomes `RateLimited`, `Transient` is retried with
/// backoff before becoming `UpstreamError`, `Fatal` becomes `UpstreamError`
/// immediately, and `Timeout` becomes `Timeout`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected the session or an auth step.
    #[error("backend auth failure: {0}")]
    Auth(String),

    /// The backend signalled a flood/rate-limit with a suggested wait.
    #[error("backend flood wait: {}s", retry_after.as_secs())]
    Flood {
        /// How long the backend asked us to wait.
        retry_after: Duration,
    },

    /// A transient network condition; safe to retry.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// A permanent failure; retrying will not help.
    #[error("backend failure: {0}")]
    Fatal(String),

    /// The backend did not answer in time.
    #[error("backend call timed out")]
    Timeout,
}

/// Async call-and-result contract to the messaging platform.
///
/// One adapter instance is bound to one account session. Implementations
/// must be safe to share across concurrent requests; serialization of
/// state-mutating calls is the dispatcher's job, not the adapter's.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Invoke a named binding with normalized arguments.
    async fn call(
        &self,
        binding: &str,
        arguments: &JsonMap,
    ) -> Result<serde_json::Value, BackendError>;

    /// Ask the platform to send a verification code to `phone`.
    async fn request_login_code(&self, phone: &str) -> Result<(), BackendError>;

    /// Submit the verification code.
    async fn submit_code(&self, code: &str) -> Result<SignInOutcome, BackendError>;

    /// Submit the second-factor secret.
    async fn submit_second_factor(&self, secret: &str) -> Result<SessionBlob, BackendError>;

    /// Resume a previously persisted session.
    async fn restore_session(&self, blob: &SessionBlob) -> Result<(), BackendError>;

    /// Sign out and revoke the session on the backend side.
    async fn invalidate(&self) -> Result<(), BackendError>;
}
