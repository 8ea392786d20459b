//! Bounded retry with exponential backoff for transient API failures.
//!
//! Only [`DataError::TransientNetwork`] is retried. Auth, malformed payload and
//! other HTTP failures are returned on the first attempt.
//!
//! ```text
//! delay(attempt) = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
//! ```

use crate::error::DataError;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Default maximum number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(250);

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the delay.
    Retry {
        /// How long to wait before retrying
        delay: Duration,
        /// The attempt number of the retry (1-indexed)
        attempt: u32,
    },
    /// Give up and surface the error.
    DoNotRetry,
}

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit backoff settings and no jitter.
    ///
    /// # Arguments
    /// * `max_attempts` - Attempts including the initial one (clamped to >= 1)
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Upper bound for any single delay
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: Duration::ZERO,
        }
    }

    /// Default backoff with a custom attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Maximum attempts configured.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempt` (1-indexed) failed with `error`.
    pub fn should_retry(&self, error: &DataError, attempt: u32) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry;
        }

        let delay = self.delay_for(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw_ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);

        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_jitter.as_millis() as u64)
        };

        Duration::from_millis(capped_ms as u64 + jitter_ms)
    }
}
