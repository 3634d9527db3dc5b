//! Exponential backoff delay computation
//!
//! Pure computation with no side effects beyond drawing jitter randomness:
//! `raw = min(base_delay * multiplier^(n-1), max_delay)`, optionally
//! randomized uniformly within `[0, raw]`.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::constants::MAX_BACKOFF_EXPONENT;

/// Computes the delay before retry attempt `n`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, jitter: bool) -> Self {
        Self { base_delay, max_delay, multiplier, jitter }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay, config.backoff_multiplier, config.jitter)
    }

    /// Delay before retry `attempt_index` (1-based).
    ///
    /// `delay(1)` is the pause after the first failed attempt and equals
    /// `base_delay` exactly when jitter is disabled.
    pub fn delay(&self, attempt_index: u32) -> Duration {
        // Exponent is capped to keep the f64 math well away from overflow.
        // Arithmetic is done in fractional seconds so sub-millisecond base
        // delays and fractional growth are not truncated.
        let exponent = attempt_index.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());

        if self.jitter && capped > 0.0 {
            Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=capped))
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}
