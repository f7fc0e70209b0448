//! Test doubles shared across the courier crates.
//!
//! Lives in its own crate so every other crate can dev-depend on the same
//! [`MockBackend`] instead of growing private copies.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod fixtures;
mod mock;

pub use fixtures::fast_config;
pub use mock::MockBackend;
