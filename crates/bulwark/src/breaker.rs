//! Circuit breaker state machines, keyed per endpoint
//!
//! Each endpoint key owns an independent CLOSED → OPEN → HALF_OPEN machine.
//! Counter updates use atomics so concurrent callers sharing a key never lose
//! an increment, and half-open admission is a single compare-exchange so the
//! probe limit cannot be exceeded.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_MAX_CALLS, DEFAULT_MONITORING_PERIOD,
    DEFAULT_RESET_TIMEOUT,
};
use crate::error::Error;

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Lets breakers use real monotonic time in production and controlled mock
/// time in tests, so timeout-based transitions can be tested without delays.
pub trait Clock: Send + Sync + 'static {
    /// Get the current instant (monotonic time)
    fn now(&self) -> Instant;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed offset, so a test can hold one handle and
/// advance time for a breaker holding another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance the mock clock by a duration without an actual delay.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let elapsed = self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO);
        self.start + elapsed
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, admitting requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, admitting limited probes to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting probes
    pub reset_timeout: Duration,
    /// Window within which failures count as consecutive; a failure arriving
    /// later than this after the previous one restarts the count
    pub monitoring_period: Duration,
    /// Probe calls admitted while half-open; the same number of consecutive
    /// successes closes the circuit
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            monitoring_period: DEFAULT_MONITORING_PERIOD,
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfiguration {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_max_calls == 0 {
            return Err(Error::InvalidConfiguration {
                message: "half_open_max_calls must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.config.monitoring_period = period;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> Result<CircuitBreakerConfig, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Per-endpoint circuit breaker state machine
///
/// Admission (`try_admit`) and outcome reporting (`record_success` /
/// `record_failure`) are safe to call from any number of tasks concurrently.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    last_failure_at: RwLock<Option<Instant>>,
    half_open_calls: AtomicU32,
    half_open_successes: AtomicU32,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures.load(Ordering::Acquire))
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker backed by the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing).
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            last_failure_at: RwLock::new(None),
            half_open_calls: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            clock,
        }
    }

    /// Check whether a call may proceed, reserving a probe slot when
    /// half-open.
    ///
    /// An open circuit whose `reset_timeout` has elapsed transitions to
    /// half-open before the admission decision. Returns `false` without any
    /// side effect on the network when the call must be rejected.
    pub fn try_admit(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.reserve_half_open_slot(),
            CircuitState::Open => {
                if !self.reset_timeout_elapsed() {
                    return false;
                }
                self.transition_to_half_open();
                self.reserve_half_open_slot()
            }
        }
    }

    /// Record a successful attempt.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.half_open_max_calls {
                    self.transition_to_closed();
                    info!(successes, "circuit breaker closed after successful probes");
                }
            }
            CircuitState::Open => {
                // A late completion from before the trip; nothing to update.
                debug!("success observed while circuit open");
            }
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&self) {
        let now = self.clock.now();

        match self.state() {
            CircuitState::Closed => {
                let failures = if self.previous_failure_stale(now) {
                    self.consecutive_failures.store(1, Ordering::Release);
                    1
                } else {
                    self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
                };

                if let Ok(mut last) = self.last_failure_at.write() {
                    *last = Some(now);
                }

                if failures >= self.config.failure_threshold {
                    self.trip_open(now);
                    warn!(failures, "circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                // Any probe failure immediately reopens the circuit.
                self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
                if let Ok(mut last) = self.last_failure_at.write() {
                    *last = Some(now);
                }
                self.trip_open(now);
                warn!("circuit breaker reopened by failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, recovering from a poisoned lock rather than panicking.
    pub fn state(&self) -> CircuitState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("circuit breaker state lock poisoned");
                *poisoned.into_inner()
            }
        }
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    fn reset_timeout_elapsed(&self) -> bool {
        let opened_at = match self.opened_at.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        match opened_at {
            Some(at) => self.clock.now().duration_since(at) >= self.config.reset_timeout,
            // Open implies opened_at is set; treat a missing timestamp as
            // eligible so the breaker cannot wedge open forever.
            None => true,
        }
    }

    fn previous_failure_stale(&self, now: Instant) -> bool {
        let last = match self.last_failure_at.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        match last {
            Some(at) => now.duration_since(at) > self.config.monitoring_period,
            None => false,
        }
    }

    /// Atomically claim one of the `half_open_max_calls` probe slots.
    fn reserve_half_open_slot(&self) -> bool {
        let max = self.config.half_open_max_calls;
        self.half_open_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |calls| {
                if calls < max {
                    Some(calls + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn transition_to_half_open(&self) {
        if let Ok(mut state) = self.state.write() {
            // Recheck under the lock; another task may have won the race.
            if *state == CircuitState::Open {
                *state = CircuitState::HalfOpen;
                self.half_open_calls.store(0, Ordering::Release);
                self.half_open_successes.store(0, Ordering::Release);
                debug!("circuit breaker transitioned to half-open");
            }
        }
    }

    fn transition_to_closed(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = CircuitState::Closed;
        }
        self.consecutive_failures.store(0, Ordering::Release);
        self.half_open_calls.store(0, Ordering::Release);
        self.half_open_successes.store(0, Ordering::Release);
        if let Ok(mut opened) = self.opened_at.write() {
            *opened = None;
        }
    }

    fn trip_open(&self, now: Instant) {
        if let Ok(mut state) = self.state.write() {
            *state = CircuitState::Open;
        }
        if let Ok(mut opened) = self.opened_at.write() {
            *opened = Some(now);
        }
    }
}

//==============================================================================
// Registry
//==============================================================================

/// Keyed collection of circuit breakers, created lazily on first use.
///
/// Owned by one client instance; two clients never share breaker state.
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    clock: C,
}

impl CircuitBreakerRegistry<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> Self {
        Self { config, breakers: DashMap::new(), clock }
    }

    /// Fetch the breaker for `key`, creating it on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker<C>> {
        let entry = self.breakers.entry(key.to_string()).or_insert_with(|| {
            debug!(%key, "creating circuit breaker");
            Arc::new(CircuitBreaker::with_clock(self.config.clone(), self.clock.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Snapshot of every tracked key and its current state.
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().state())).collect()
    }

    /// Drop all breaker state; every key starts fresh on next use.
    pub fn clear(&self) {
        self.breakers.clear();
        info!("circuit breaker registry cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
