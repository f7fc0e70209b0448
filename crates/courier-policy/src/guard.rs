//! The policy guard itself.

use std::collections::HashSet;
use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::debug;

use courier_config::PolicyConfig;
use courier_core::{ApprovalMode, RiskLevel};
use courier_registry::MethodDescriptor;

/// Errors raised while building a guard from configuration.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// An auto-approve entry is not a valid glob pattern.
    #[error("invalid auto-approve pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying glob error.
        #[source]
        source: globset::Error,
    },
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Outcome of a policy check for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The operation proceeds without confirmation.
    Allow,
    /// The operation is suspended until the operator confirms it.
    RequireConfirmation,
    /// The operation is refused.
    Deny {
        /// Why the operation was refused.
        reason: String,
    },
}

impl Decision {
    /// Check if this decision lets the operation proceed immediately.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Check if this decision suspends the operation pending confirmation.
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::RequireConfirmation)
    }

    /// Check if this decision refuses the operation.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::RequireConfirmation => write!(f, "requires confirmation"),
            Self::Deny { reason } => write!(f, "deny: {reason}"),
        }
    }
}

/// Operation-level approval guard, compiled once from [`PolicyConfig`].
///
/// The blocklist holds exact operation names; the auto-approve list holds
/// glob patterns (`get_*`, `search_*`) matched against operation names.
#[derive(Debug)]
pub struct PolicyGuard {
    blocked: HashSet<String>,
    auto_approve: GlobSet,
    allow_reads: bool,
}

impl PolicyGuard {
    /// Build a guard from configuration, compiling the auto-approve globs.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for a malformed glob.
    pub fn new(config: &PolicyConfig) -> PolicyResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.auto_approve {
            let glob = Glob::new(pattern).map_err(|e| PolicyError::InvalidPattern {
                pattern: pattern.clone(),
                source: e,
            })?;
            builder.add(glob);
        }
        let auto_approve = builder.build().map_err(|e| PolicyError::InvalidPattern {
            pattern: config.auto_approve.join(","),
            source: e,
        })?;

        Ok(Self {
            blocked: config.blocked.iter().cloned().collect(),
            auto_approve,
            allow_reads: config.allow_reads,
        })
    }

    /// A guard that allows reads and confirms everything mutating.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            blocked: HashSet::new(),
            auto_approve: GlobSet::empty(),
            allow_reads: true,
        }
    }

    /// Decide what happens to a call of `descriptor`.
    #[must_use]
    pub fn authorize(&self, descriptor: &MethodDescriptor) -> Decision {
        if self.blocked.contains(descriptor.name) {
            debug!(operation = descriptor.name, "operation blocked by policy");
            return Decision::Deny {
                reason: format!("operation '{}' is blocked by policy", descriptor.name),
            };
        }

        if self.auto_approve.is_match(descriptor.name) {
            return Decision::Allow;
        }

        if descriptor.risk == RiskLevel::Read {
            return if self.allow_reads {
                Decision::Allow
            } else {
                Decision::RequireConfirmation
            };
        }

        match descriptor.approval {
            ApprovalMode::Auto => Decision::Allow,
            ApprovalMode::Confirm => Decision::RequireConfirmation,
        }
    }
}
