use std::time::Duration;

use chrono::Utc;

use crate::config::RetryConfig;

/// Largest share of the computed delay that jitter may add.
const MAX_JITTER_FRACTION: f64 = 0.25;

/// Bounded exponential backoff.
///
/// Attempt `n` (0-indexed) that fails sleeps `base × 2^n` before attempt
/// `n + 1`, where `base` depends on whether the failure was a rate limit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            rate_limit_base_delay: Duration::from_millis(config.rate_limit_backoff_base_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter,
        }
    }

    /// A single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay after the failed attempt with the given 0-based index.
    pub fn delay_for(&self, attempt_index: u32, rate_limited: bool) -> Duration {
        let base = if rate_limited {
            self.rate_limit_base_delay
        } else {
            self.base_delay
        };

        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        let delay = base.saturating_mul(factor).min(self.max_delay);

        if self.jitter {
            delay + jitter_for(delay)
        } else {
            delay
        }
    }

    /// Whether another attempt follows the given 0-based attempt.
    pub fn has_attempt_after(&self, attempt_index: u32) -> bool {
        attempt_index + 1 < self.max_attempts
    }
}

/// Up to a quarter of `delay`, seeded from the clock's sub-second nanos.
fn jitter_for(delay: Duration) -> Duration {
    let seed = Utc::now().timestamp_subsec_nanos() % 1000;
    delay.mul_f64(MAX_JITTER_FRACTION * f64::from(seed) / 1000.0)
}
