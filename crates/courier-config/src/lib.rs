//! Courier configuration - loaded once at startup, immutable afterwards.
//!
//! The bridge reads a single TOML file (credentials, policy lists, rate
//! limits, runtime knobs) with environment-variable fallbacks for the
//! credential fields. Changes require a restart; nothing here hot-reloads.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod loader;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_file};
pub use types::{
    BridgeConfig, BucketConfig, LimitsConfig, PolicyConfig, RetryConfig, RuntimeConfig,
    SessionConfig, TelegramConfig,
};
pub use validate::validate;
