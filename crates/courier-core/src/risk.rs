//! Risk classification and approval requirements for operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static risk label on an operation, governing approval policy and which
/// rate-limit bucket admits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Observes state without changing it.
    Read,
    /// Changes state in a way the owner could undo.
    Write,
    /// Changes state in a way that is hard or impossible to undo.
    Destructive,
}

impl RiskLevel {
    /// All levels, in ascending severity. Useful for building per-class
    /// structures such as rate-limit buckets.
    pub const ALL: [Self; 3] = [Self::Read, Self::Write, Self::Destructive];

    /// Whether this level mutates backend state.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Destructive => "destructive",
        };
        f.write_str(s)
    }
}

/// Approval an operation needs before the backend is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// May proceed without an explicit confirmation event.
    Auto,
    /// Requires an explicit confirmation event keyed by request id.
    Confirm,
}
