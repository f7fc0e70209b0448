//! Courier core - shared vocabulary for the bridge.
//!
//! This crate provides:
//! - Control-channel envelopes (request/response wire types)
//! - The error taxonomy every component maps into
//! - Request ids and risk classification
//! - The [`BackendAdapter`] contract (the opaque RPC collaborator that
//!   performs the actual network calls to the messaging platform)
//!
//! Everything here is plain data or a trait seam; no component logic lives in
//! this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod backend;
mod envelope;
mod error;
mod ids;
mod risk;

pub use backend::{BackendAdapter, BackendError, SessionBlob, SignInOutcome};
pub use envelope::{ErrorBody, JsonMap, RequestEnvelope, ResponseEnvelope, ResponsePayload};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use ids::RequestId;
pub use risk::{ApprovalMode, RiskLevel};
