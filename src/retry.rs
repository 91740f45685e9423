//! Exponential backoff with full jitter for transient transport failures.
//!
//! Retries live only inside the gateway clients (embedding, LLM); business
//! errors are never retried.

use std::time::Duration;

use rand::Rng;

/// Backoff schedule: exponential doubling from a base delay, capped, with
/// full jitter (a uniform draw over `[0, exp_delay)`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    /// First-retry delay before jitter.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Total attempts (first try included).
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl Backoff {
    /// Jittered delay before retry number `attempt` (0-based: the delay
    /// after the first failure is `delay(0)`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max);
        if exp.is_zero() {
            return exp;
        }
        let jittered = rand::rng().random_range(0..=exp.as_millis());
        Duration::from_millis(u64::try_from(jittered).unwrap_or(u64::MAX))
    }

    /// Whether another attempt is allowed after `attempt` tries.
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
