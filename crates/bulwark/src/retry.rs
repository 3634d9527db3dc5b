//! Retry wrapper for arbitrary async operations
//!
//! Applies the same attempt-loop and backoff semantics as the HTTP client to
//! any caller-supplied operation, minus HTTP status interpretation: every
//! error is treated as retryable until attempts are exhausted, then the last
//! error is returned unchanged.

use std::fmt;
use std::future::Future;

use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::config::RetryConfig;

/// Single-method wrapper capturing a retry configuration.
///
/// Equivalent to a retrying decorator: construct once, then `run` any
/// operation under the captured attempt-loop semantics.
#[derive(Debug, Clone)]
pub struct Retrier {
    max_retries: u32,
    backoff: BackoffPolicy,
}

impl Retrier {
    pub fn new(config: &RetryConfig) -> Self {
        Self { max_retries: config.max_retries, backoff: BackoffPolicy::from_config(config) }
    }

    /// Run `operation` with up to `max_retries + 1` attempts, sleeping the
    /// backoff delay between failures.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let total_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= total_attempts {
                        warn!(attempts = attempt, %error, "retries exhausted");
                        return Err(error);
                    }

                    let delay = self.backoff.delay(attempt);
                    debug!(attempt, ?delay, %error, "operation failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Convenience function mirroring [`Retrier::run`] for one-off call sites.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    Retrier::new(config).run(operation).await
}
