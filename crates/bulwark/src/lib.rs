//! Resilient outbound HTTP for services that cannot afford to trust the
//! network.
//!
//! The crate wraps `reqwest` with the classic fault-tolerance stack:
//! - **Retries** with exponential backoff and optional full jitter
//! - **Circuit breakers** tracked per endpoint, with half-open probing
//! - **Per-attempt timeouts** that discard late completions
//! - **Metrics** recording one outcome per logical request
//!
//! ```no_run
//! use bulwark::{HttpClient, RetryConfig};
//!
//! # async fn example() -> bulwark::Result<()> {
//! let client = HttpClient::with_config(RetryConfig::default())?;
//! let body = client.get("https://api.example.com/status").await?;
//! println!("{body:?}");
//! # Ok(())
//! # }
//! ```
//!
//! A caller always receives either a decoded body or exactly one typed
//! [`Error`] per logical request. The same attempt-loop semantics are
//! available for non-HTTP operations through [`retry`] / [`Retrier`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod breaker;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod timeout;

pub use backoff::BackoffPolicy;
pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerRegistry,
    CircuitState, Clock, MockClock, SystemClock,
};
pub use client::{HttpClient, HttpClientBuilder, Method, ResponseBody};
pub use config::{RequestOptions, RetryConfig, RetryConfigBuilder};
pub use error::{Error, Result};
pub use metrics::{MetricsCollector, MetricsSnapshot, RequestOutcome};
pub use retry::{retry, Retrier};
pub use timeout::TimeoutController;
