//! Configuration types.
//!
//! Credential fields never appear in `Debug` output or serialized form;
//! the rest of the tree round-trips through TOML.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for one bridge process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Telegram application credentials and account identity.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Session blob storage.
    #[serde(default)]
    pub session: SessionConfig,
    /// Approval policy lists.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Rate-limit buckets per risk class.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Concurrency and timeout knobs.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Retry and flood-wait handling.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Telegram application credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Application id issued by the platform.
    #[serde(default)]
    pub api_id: Option<String>,
    /// Application secret. Redacted from Debug, never serialized.
    #[serde(default, skip_serializing)]
    pub api_hash: Option<String>,
    /// Phone/account identifier used for sign-in.
    #[serde(default)]
    pub phone: Option<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("has_api_hash", &self.api_hash.is_some())
            .field("phone", &self.phone.as_deref().map(|_| "***"))
            .finish()
    }
}

/// Where the persisted session blob lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// State directory; platform state dir when unset.
    pub state_dir: Option<PathBuf>,
    /// Blob file name inside the state directory.
    pub file_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            file_name: "courier.session".to_string(),
        }
    }
}

impl SessionConfig {
    /// Resolve the effective state directory.
    ///
    /// Uses the configured directory when set, otherwise the platform state
    /// directory (XDG state home on Linux) for the `courier` application.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::NoStateDir`] when no directory can be
    /// determined.
    pub fn resolve_state_dir(&self) -> crate::ConfigResult<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "courier")
            .map(|dirs| {
                dirs.state_dir()
                    .unwrap_or_else(|| dirs.data_local_dir())
                    .to_path_buf()
            })
            .ok_or(crate::ConfigError::NoStateDir)
    }

    /// Full path of the session blob file.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::ConfigError::NoStateDir`] from directory
    /// resolution.
    pub fn blob_path(&self) -> crate::ConfigResult<PathBuf> {
        Ok(self.resolve_state_dir()?.join(&self.file_name))
    }
}

/// Approval policy lists, consumed by the policy guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Operation-name glob patterns permitted without confirmation.
    pub auto_approve: Vec<String>,
    /// Operation names denied outright, regardless of the allowlist.
    pub blocked: Vec<String>,
    /// Whether read-class operations are always allowed.
    pub allow_reads: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_approve: Vec::new(),
            blocked: Vec::new(),
            allow_reads: true,
        }
    }
}

/// One token bucket's parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum tokens (burst size).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Maximum requests waiting for a token before overflow fails fast.
    pub queue_depth: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            refill_per_sec: 0.5,
            queue_depth: 64,
        }
    }
}

/// Per-risk-class rate limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Bucket admitting read operations.
    pub read: BucketConfig,
    /// Bucket admitting write operations.
    pub write: BucketConfig,
    /// Bucket admitting destructive operations.
    pub destructive: BucketConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            read: BucketConfig {
                capacity: 30,
                refill_per_sec: 0.5,
                queue_depth: 64,
            },
            write: BucketConfig {
                capacity: 10,
                refill_per_sec: 0.2,
                queue_depth: 32,
            },
            destructive: BucketConfig {
                capacity: 3,
                refill_per_sec: 0.05,
                queue_depth: 8,
            },
        }
    }
}

/// Concurrency and timeout knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum read operations in flight at once.
    pub max_concurrent_reads: usize,
    /// Upper bound on any single request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 5,
            request_timeout_secs: 120,
        }
    }
}

impl RuntimeConfig {
    /// The request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry and flood-wait parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt cap for transient failures (first try included).
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Delay multiplier per attempt.
    pub multiplier: f64,
    /// Cap on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Backend flood waits above this many seconds fail immediately.
    pub flood_wait_ceiling_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            flood_wait_ceiling_secs: 300,
        }
    }
}

impl RetryConfig {
    /// Base delay as a [`Duration`].
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay cap as a [`Duration`].
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Flood-wait ceiling as a [`Duration`].
    #[must_use]
    pub fn flood_wait_ceiling(&self) -> Duration {
        Duration::from_secs(self.flood_wait_ceiling_secs)
    }
}

impl LimitsConfig {
    /// The bucket for a risk class.
    #[must_use]
    pub fn bucket(&self, risk: courier_core::RiskLevel) -> BucketConfig {
        match risk {
            courier_core::RiskLevel::Read => self.read,
            courier_core::RiskLevel::Write => self.write,
            courier_core::RiskLevel::Destructive => self.destructive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = BridgeConfig::default();
        assert!(config.policy.allow_reads);
        assert_eq!(config.runtime.max_concurrent_reads, 5);
        assert_eq!(config.retry.flood_wait_ceiling_secs, 300);
        assert!(config.limits.destructive.capacity < config.limits.read.capacity);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = TelegramConfig {
            api_id: Some("12345".to_string()),
            api_hash: Some("deadbeef-secret".to_string()),
            phone: Some("+15550100".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("deadbeef-secret"));
        assert!(!debug.contains("+15550100"));
        assert!(debug.contains("has_api_hash: true"));
    }

    #[test]
    fn test_serialize_omits_api_hash() {
        let config = TelegramConfig {
            api_id: Some("12345".to_string()),
            api_hash: Some("deadbeef-secret".to_string()),
            phone: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("deadbeef-secret"));
        assert!(!json.contains("api_hash"));
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_src = r#"
            [telegram]
            api_id = "12345"

            [limits.read]
            capacity = 5
            refill_per_sec = 10.0
            queue_depth = 16

            [runtime]
            request_timeout_secs = 30
        "#;
        let config: BridgeConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.telegram.api_id.as_deref(), Some("12345"));
        assert_eq!(config.limits.read.capacity, 5);
        // Unspecified sections keep their defaults.
        assert_eq!(config.limits.write.capacity, 10);
        assert_eq!(config.runtime.request_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let result: Result<BridgeConfig, _> = toml::from_str("[surprise]\nx = 1\n");
        assert!(result.is_err());
    }
}
