//! Approval policy for bridge operations.
//!
//! The [`PolicyGuard`] decides, per operation, whether a call proceeds
//! immediately, needs an explicit confirmation round-trip, or is refused
//! outright. It is built once from configuration and never changes at
//! runtime.
//!
//! # Check Order
//!
//! 1. Is the operation on the blocklist? -> `Deny`
//! 2. Does the operation match an auto-approve pattern? -> `Allow`
//! 3. Is it a read and reads are allowed? -> `Allow`
//! 4. Otherwise -> `RequireConfirmation`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod guard;

pub use guard::{Decision, PolicyError, PolicyGuard, PolicyResult};
