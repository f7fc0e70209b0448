//! Configuration fixtures.

use courier_config::BridgeConfig;

/// A configuration tuned for tests: generous buckets so admission control
/// never interferes unless a test shrinks them, and short retry delays so
/// retry paths finish quickly under a paused clock.
#[must_use]
pub fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.limits.read.capacity = 1_000;
    config.limits.read.refill_per_sec = 1_000.0;
    config.limits.write.capacity = 1_000;
    config.limits.write.refill_per_sec = 1_000.0;
    config.limits.destructive.capacity = 1_000;
    config.limits.destructive.refill_per_sec = 1_000.0;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}
