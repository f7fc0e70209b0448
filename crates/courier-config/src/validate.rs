//! Semantic validation of a loaded configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{BridgeConfig, BucketConfig};

/// Validate a configuration tree.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first offending field.
pub fn validate(config: &BridgeConfig) -> ConfigResult<()> {
    for (name, bucket) in [
        ("limits.read", config.limits.read),
        ("limits.write", config.limits.write),
        ("limits.destructive", config.limits.destructive),
    ] {
        validate_bucket(name, bucket)?;
    }

    if config.runtime.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.request_timeout_secs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if config.runtime.max_concurrent_reads == 0 {
        return Err(ConfigError::ValidationError {
            field: "runtime.max_concurrent_reads".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError {
            field: "retry.max_attempts".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if config.retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError {
            field: "retry.multiplier".to_string(),
            message: "must be at least 1.0".to_string(),
        });
    }

    Ok(())
}

fn validate_bucket(name: &str, bucket: BucketConfig) -> ConfigResult<()> {
    if bucket.capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: format!("{name}.capacity"),
            message: "must be greater than zero".to_string(),
        });
    }
    if bucket.refill_per_sec <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: format!("{name}.refill_per_sec"),
            message: "must be positive".to_string(),
        });
    }
    Ok(())
}
