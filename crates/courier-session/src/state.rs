//! The sign-in state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the session is in its lifecycle.
///
/// ```text
/// Unauthenticated --begin_sign_in--> AwaitingCode
/// AwaitingCode --submit_code--> Authenticated | AwaitingSecondFactor
/// AwaitingSecondFactor --submit_second_factor--> Authenticated
/// any --sign_out--> Revoked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No session; nothing has been attempted yet.
    Unauthenticated,
    /// A code was requested and is expected next.
    AwaitingCode,
    /// The code was accepted but a second factor is required.
    AwaitingSecondFactor,
    /// Fully signed in; platform operations may run.
    Authenticated,
    /// The session was signed out or the sign-in flow was abandoned.
    Revoked,
}

impl AuthState {
    /// Whether platform operations are admissible in this state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Whether a sign-in flow is currently in progress.
    #[must_use]
    pub fn is_signing_in(&self) -> bool {
        matches!(self, Self::AwaitingCode | Self::AwaitingSecondFactor)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingCode => "awaiting_code",
            Self::AwaitingSecondFactor => "awaiting_second_factor",
            Self::Authenticated => "authenticated",
            Self::Revoked => "revoked",
        };
        write!(f, "{name}")
    }
}
