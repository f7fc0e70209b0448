//! Exponential backoff with jitter for transient backend failures.

use std::time::Duration;

use rand::Rng as _;

use courier_config::RetryConfig;

/// Delay schedule for retrying transient failures.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: f64,
    cap: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            base: retry.base_delay(),
            multiplier: retry.multiplier,
            cap: retry.max_delay(),
            max_attempts: retry.max_attempts,
        }
    }

    /// Total attempts allowed, the first try included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The deterministic delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(32).min(32);
        let factor = self.multiplier.powi(exponent);
        let delay = self.base.mul_f64(factor.max(1.0));
        delay.min(self.cap)
    }

    /// [`delay`](Self::delay) plus up to 50% uniform jitter, so retries from
    /// concurrent requests spread out instead of thundering together.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.delay(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..=0.5);
        base.mul_f64(1.0 + jitter).min(self.cap.mul_f64(1.5))
    }
}
