// Defaults for retry and circuit breaker configuration
use std::time::Duration;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default maximum delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Default exponential backoff multiplier
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default per-attempt timeout
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Status codes retried by default
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Circuit breaker: default consecutive-failure threshold
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit breaker: default time an open circuit waits before probing
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker: default window within which failures count as consecutive
pub const DEFAULT_MONITORING_PERIOD: Duration = Duration::from_secs(60);

/// Circuit breaker: default max probe calls admitted while half-open
pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 3;

/// Maximum failed outcomes retained in a metrics snapshot
pub const RECENT_FAILURES_CAP: usize = 50;

/// Maximum outcomes retained in the metrics log before eviction
pub const OUTCOME_LOG_CAP: usize = 1024;
