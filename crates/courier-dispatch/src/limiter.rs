//! Per-risk-class admission control.
//!
//! Classic token buckets with fractional refill. A caller without a token
//! joins a FIFO queue and waits for refill; the queue is bounded by a depth,
//! beyond which admission fails fast with a suggested retry interval. A
//! later arrival can never take a token a queued waiter is sleeping for.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use courier_config::{BucketConfig, LimitsConfig};
use courier_core::{CoreError, CoreResult, RiskLevel};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    waiters: usize,
}

/// One token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    queue_depth: usize,
    state: Mutex<BucketState>,
    // Tokio's mutex is fair, so waiters drain in arrival order.
    turn: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for BucketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketState")
            .field("tokens", &self.tokens)
            .field("waiters", &self.waiters)
            .finish()
    }
}

impl TokenBucket {
    /// A full bucket with the given parameters.
    #[must_use]
    pub fn new(config: BucketConfig) -> Self {
        Self {
            capacity: f64::from(config.capacity),
            refill_per_sec: config.refill_per_sec,
            queue_depth: config.queue_depth,
            state: Mutex::new(BucketState {
                tokens: f64::from(config.capacity),
                last_refill: Instant::now(),
                waiters: 0,
            }),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// Take one token, waiting in FIFO order when the bucket is empty.
    ///
    /// Cancel-safe: a caller dropped mid-wait (timeout, cancellation) gives
    /// its queue slot back.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RateLimited`] when the waiter queue is full; the
    /// error carries the estimated wait until a token frees up.
    pub async fn acquire(&self) -> CoreResult<()> {
        {
            let mut state = self.lock()?;
            self.refill(&mut state);

            // A token is only up for grabs when nobody is queued ahead.
            if state.waiters == 0 && state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Ok(());
            }

            if state.waiters >= self.queue_depth {
                let retry_after = self.time_until_token(&state);
                debug!(
                    waiters = state.waiters,
                    retry_after_ms = retry_after.as_millis(),
                    "admission queue full"
                );
                return Err(CoreError::RateLimited {
                    reason: "admission queue is full".to_string(),
                    retry_after: Some(retry_after),
                });
            }

            state.waiters += 1;
        }

        let _queued = WaiterGuard { bucket: self };
        let _turn = self.turn.lock().await;
        loop {
            let wait = {
                let mut state = self.lock()?;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                self.time_until_token(&state)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Whether a token is available right now, without taking one.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.lock().is_ok_and(|mut state| {
            self.refill(&mut state);
            state.tokens >= 1.0
        })
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    fn time_until_token(&self, state: &BucketState) -> Duration {
        let deficit = (1.0 - state.tokens).max(0.0);
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, BucketState>> {
        self.state
            .lock()
            .map_err(|_| CoreError::Internal("rate limiter lock poisoned".to_string()))
    }
}

/// Releases a queue slot when the waiting future completes or is dropped.
struct WaiterGuard<'a> {
    bucket: &'a TokenBucket,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.bucket.state.lock() {
            state.waiters = state.waiters.saturating_sub(1);
        }
    }
}

/// Admission control over the three risk-class buckets.
#[derive(Debug)]
pub struct RateLimiter {
    read: TokenBucket,
    write: TokenBucket,
    destructive: TokenBucket,
}

impl RateLimiter {
    /// Build buckets from configuration.
    #[must_use]
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            read: TokenBucket::new(limits.read),
            write: TokenBucket::new(limits.write),
            destructive: TokenBucket::new(limits.destructive),
        }
    }

    /// Admit one request of the given risk class.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RateLimited`] when the class's waiter queue
    /// overflows.
    pub async fn admit(&self, risk: RiskLevel) -> CoreResult<()> {
        self.bucket(risk).acquire().await
    }

    fn bucket(&self, risk: RiskLevel) -> &TokenBucket {
        match risk {
            RiskLevel::Read => &self.read,
            RiskLevel::Write => &self.write,
            RiskLevel::Destructive => &self.destructive,
        }
    }
}
