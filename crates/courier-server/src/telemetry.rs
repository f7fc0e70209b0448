//! Process-wide tracing setup.
//!
//! Logs go to stderr so the control channel on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter.
const FILTER_ENV: &str = "COURIER_LOG";

/// Install the global tracing subscriber.
///
/// The filter comes from `COURIER_LOG` (falling back to `info`), using the
/// usual `tracing-subscriber` directive syntax. Calling this twice is
/// harmless; the second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
