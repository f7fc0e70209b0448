//! Session lifecycle for the courier bridge.
//!
//! Owns the sign-in state machine (phone code, then an optional second
//! factor), persists the resulting opaque session blob to disk, and answers
//! the "are we signed in" question the dispatcher gates on.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod manager;
mod state;
mod store;

pub use error::{SessionError, SessionResult};
pub use manager::{SessionManager, SignInStep};
pub use state::AuthState;
pub use store::SessionStore;
