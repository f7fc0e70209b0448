//! Config loading: one TOML file plus environment fallbacks.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::BridgeConfig;
use crate::validate;

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Environment variable prefix for credential fallbacks.
const ENV_PREFIX: &str = "COURIER_";

/// Load the bridge configuration.
///
/// When `path` is given the file must exist and parse; when it is `None`
/// the embedded defaults are used. In both cases `COURIER_API_ID`,
/// `COURIER_API_HASH` and `COURIER_PHONE` fill credential fields that the
/// file left unset, and the result is validated.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if the
/// final configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<BridgeConfig> {
    let mut config = match path {
        Some(p) => {
            let config = read_file(p)?;
            info!(path = %p.display(), "loaded config file");
            config
        },
        None => {
            debug!("no config file given, using defaults");
            BridgeConfig::default()
        },
    };

    apply_env_fallbacks(&mut config);
    validate::validate(&config)?;
    Ok(config)
}

/// Load a configuration from a specific file, without env fallbacks.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<BridgeConfig> {
    let config = read_file(path)?;
    validate::validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<BridgeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    // Checked after reading to avoid a TOCTOU between stat and read.
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Fill unset credential fields from the environment.
fn apply_env_fallbacks(config: &mut BridgeConfig) {
    let fallback = |slot: &mut Option<String>, var: &str| {
        if slot.is_none() {
            if let Ok(value) = std::env::var(format!("{ENV_PREFIX}{var}")) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
    };

    fallback(&mut config.telegram.api_id, "API_ID");
    fallback(&mut config.telegram.api_hash, "API_HASH");
    fallback(&mut config.telegram.phone, "PHONE");
}
