//! The courier request pipeline.
//!
//! A request entering [`Dispatcher::dispatch`] passes, in order: duplicate-id
//! detection, registry lookup, argument validation, the session gate, the
//! policy guard (possibly suspending for confirmation), per-risk admission
//! control, ordering locks, and finally the backend call with flood handling
//! and bounded retries. Exactly one terminal response comes out, whatever
//! happens in between.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod backoff;
mod confirm;
mod dispatcher;
mod limiter;

pub use backoff::BackoffPolicy;
pub use confirm::{ConfirmationLedger, PendingConfirmation};
pub use dispatcher::Dispatcher;
pub use limiter::{RateLimiter, TokenBucket};
