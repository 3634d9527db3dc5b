//! Retry configuration and per-call overrides
//!
//! A [`RetryConfig`] is created once at client construction and never mutated
//! afterwards. Per-call [`RequestOptions`] produce an ephemeral merged copy,
//! leaving the original untouched.

use std::collections::HashSet;
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;
use crate::constants::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRYABLE_STATUS_CODES,
};
use crate::error::Error;

/// Retry behavior for a client instance.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any computed delay
    pub max_delay: Duration,
    /// Exponential growth factor, must be greater than 1
    pub backoff_multiplier: f64,
    /// Randomize each delay uniformly within `[0, computed]`
    pub jitter: bool,
    /// Wall-clock limit for a single attempt
    pub timeout: Duration,
    /// Response statuses treated as transient failures
    pub retryable_status_codes: HashSet<u16>,
    /// Circuit breaker tuning; `None` disables the breaker for this client
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            circuit_breaker: None,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.backoff_multiplier <= 1.0 {
            return Err(Error::InvalidConfiguration {
                message: "backoff_multiplier must be greater than 1".to_string(),
            });
        }

        if self.base_delay > self.max_delay {
            return Err(Error::InvalidConfiguration {
                message: "base_delay must not exceed max_delay".to_string(),
            });
        }

        if self.timeout.is_zero() {
            return Err(Error::InvalidConfiguration {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }

        Ok(())
    }

    /// Ephemeral merged copy for one call; the original is never mutated.
    pub(crate) fn merged_with(&self, options: &RequestOptions) -> RetryConfig {
        let mut effective = self.clone();
        if let Some(timeout) = options.timeout {
            effective.timeout = timeout;
        }
        if let Some(max_retries) = options.max_retries {
            effective.max_retries = max_retries;
        }
        effective
    }
}

/// Builder for [`RetryConfig`] with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Replace the retryable status set.
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.config.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<RetryConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-call overrides applied on top of the client's [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Override the per-attempt timeout for this call
    pub timeout: Option<Duration>,
    /// Override the retry count for this call
    pub max_retries: Option<u32>,
    /// Extra headers attached to every attempt of this call
    pub headers: Vec<(String, String)>,
    /// Track breaker state under this label instead of the URL host+path
    pub breaker_key: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn breaker_key(mut self, key: impl Into<String>) -> Self {
        self.breaker_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates the default retryable set required by the retry loop.
    #[test]
    fn test_default_retryable_status_codes() {
        let config = RetryConfig::default();
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(config.retryable_status_codes.contains(&code), "{code} should be retryable");
        }
        assert!(!config.retryable_status_codes.contains(&400));
        assert!(!config.retryable_status_codes.contains(&404));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_sets_all_fields() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_secs(1))
            .backoff_multiplier(3.0)
            .jitter(false)
            .timeout(Duration::from_secs(2))
            .retryable_status_codes([500, 503])
            .build()
            .expect("valid config");

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_millis(10));
        assert_eq!(config.max_delay, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 3.0);
        assert!(!config.jitter);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.retryable_status_codes.len(), 2);
        assert!(config.circuit_breaker.is_none());
    }

    #[test]
    fn test_validation_rejects_multiplier_at_or_below_one() {
        let result = RetryConfig::builder().backoff_multiplier(1.0).build();
        assert!(result.is_err());

        let result = RetryConfig::builder().backoff_multiplier(0.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_delay_bounds() {
        let result = RetryConfig::builder()
            .base_delay(Duration::from_secs(5))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = RetryConfig::builder().timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_covers_nested_breaker_config() {
        let breaker = CircuitBreakerConfig { failure_threshold: 0, ..Default::default() };
        let mut config = RetryConfig::default();
        config.circuit_breaker = Some(breaker);
        assert!(config.validate().is_err());
    }

    /// Per-call overrides must produce a merged copy, never mutate the base.
    #[test]
    fn test_merge_does_not_mutate_base() {
        let base = RetryConfig::default();
        let options = RequestOptions::new().timeout(Duration::from_millis(5)).max_retries(9);

        let merged = base.merged_with(&options);
        assert_eq!(merged.timeout, Duration::from_millis(5));
        assert_eq!(merged.max_retries, 9);

        assert_eq!(base.timeout, DEFAULT_ATTEMPT_TIMEOUT);
        assert_eq!(base.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_merge_without_overrides_is_identity() {
        let base = RetryConfig::default();
        let merged = base.merged_with(&RequestOptions::new());
        assert_eq!(merged.timeout, base.timeout);
        assert_eq!(merged.max_retries, base.max_retries);
    }

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::new()
            .header("x-api-key", "secret")
            .header("accept", "application/json")
            .breaker_key("payments");

        assert_eq!(options.headers.len(), 2);
        assert_eq!(options.breaker_key.as_deref(), Some("payments"));
        assert!(options.timeout.is_none());
    }
}
