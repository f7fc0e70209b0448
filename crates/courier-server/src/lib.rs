//! The control-channel surface of the courier bridge.
//!
//! Exposes the operation catalog, routes request envelopes into the
//! dispatcher, and speaks newline-delimited JSON over any async byte stream
//! (stdio in deployment). Also owns process-wide tracing setup.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod catalog;
mod server;
pub mod telemetry;

pub use catalog::{OperationInfo, catalog};
pub use server::BridgeServer;
