//! Per-request outcome metrics
//!
//! The collector keeps an append-only log of one [`RequestOutcome`] per
//! logical request (not per attempt) and derives aggregate statistics on
//! demand. Recording must never panic or mask the primary request outcome,
//! so a poisoned lock is recovered rather than propagated.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::breaker::CircuitState;
use crate::constants::{OUTCOME_LOG_CAP, RECENT_FAILURES_CAP};

/// Terminal outcome of one logical request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub timestamp: SystemTime,
    pub duration: Duration,
    /// Network attempts performed; 0 when the breaker rejected the call
    pub attempts: u32,
    pub succeeded: bool,
    pub http_status: Option<u16>,
    pub error_kind: Option<&'static str>,
}

/// Aggregate statistics derived from the outcome log.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    /// Percentage in 0–100; 0 when no requests have been recorded
    pub success_rate: f64,
    pub average_attempts: f64,
    pub average_duration: Duration,
    /// Failed outcomes, most-recent-first, capped at `RECENT_FAILURES_CAP`
    pub recent_failures: Vec<RequestOutcome>,
    /// Current state per breaker key; empty when the breaker is disabled
    pub circuit_breaker_states: HashMap<String, CircuitState>,
}

/// Thread-safe outcome log with on-demand aggregation.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    outcomes: Mutex<VecDeque<RequestOutcome>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one outcome. Never panics; the oldest entry is evicted once
    /// the retention cap is reached.
    pub fn record(&self, outcome: RequestOutcome) {
        let mut log = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("metrics lock poisoned during record");
                poisoned.into_inner()
            }
        };

        if log.len() >= OUTCOME_LOG_CAP {
            log.pop_front();
        }
        log.push_back(outcome);
    }

    /// Recompute aggregate statistics from the log.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let log = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("metrics lock poisoned during snapshot");
                poisoned.into_inner()
            }
        };

        let total = log.len() as u64;
        if total == 0 {
            return MetricsSnapshot::default();
        }

        let successes = log.iter().filter(|outcome| outcome.succeeded).count();
        let attempts_sum: f64 = log.iter().map(|outcome| f64::from(outcome.attempts)).sum();
        let duration_sum: Duration = log.iter().map(|outcome| outcome.duration).sum();

        let recent_failures = log
            .iter()
            .rev()
            .filter(|outcome| !outcome.succeeded)
            .take(RECENT_FAILURES_CAP)
            .cloned()
            .collect();

        MetricsSnapshot {
            total_requests: total,
            success_rate: 100.0 * successes as f64 / total as f64,
            average_attempts: attempts_sum / total as f64,
            average_duration: duration_sum / total as u32,
            recent_failures,
            circuit_breaker_states: HashMap::new(),
        }
    }

    /// Empty the outcome log.
    pub fn clear(&self) {
        let mut log = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(succeeded: bool, attempts: u32, duration_ms: u64) -> RequestOutcome {
        RequestOutcome {
            timestamp: SystemTime::now(),
            duration: Duration::from_millis(duration_ms),
            attempts,
            succeeded,
            http_status: if succeeded { Some(200) } else { Some(500) },
            error_kind: if succeeded { None } else { Some("http") },
        }
    }

    /// An empty collector reports a 0 success rate, never NaN.
    #[test]
    fn test_empty_snapshot() {
        let collector = MetricsCollector::new();
        let snapshot = collector.snapshot();

        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.average_attempts, 0.0);
        assert_eq!(snapshot.average_duration, Duration::ZERO);
        assert!(snapshot.recent_failures.is_empty());
    }

    #[test]
    fn test_success_rate_boundaries() {
        let collector = MetricsCollector::new();
        collector.record(outcome(false, 3, 10));
        assert_eq!(collector.snapshot().success_rate, 0.0);
        assert_eq!(collector.snapshot().total_requests, 1);

        collector.clear();
        collector.record(outcome(true, 1, 10));
        assert_eq!(collector.snapshot().success_rate, 100.0);
    }

    #[test]
    fn test_averages() {
        let collector = MetricsCollector::new();
        collector.record(outcome(true, 1, 10));
        collector.record(outcome(false, 3, 30));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.success_rate, 50.0);
        assert_eq!(snapshot.average_attempts, 2.0);
        assert_eq!(snapshot.average_duration, Duration::from_millis(20));
    }

    #[test]
    fn test_recent_failures_most_recent_first_and_capped() {
        let collector = MetricsCollector::new();
        for i in 0..60 {
            let mut failed = outcome(false, 1, 1);
            failed.http_status = Some(500 + i as u16);
            collector.record(failed);
            collector.record(outcome(true, 1, 1));
        }

        let snapshot = collector.snapshot();
        let failures = &snapshot.recent_failures;
        assert_eq!(failures.len(), RECENT_FAILURES_CAP);
        // Most recent failure first.
        assert_eq!(failures[0].http_status, Some(559));
        assert_eq!(failures[1].http_status, Some(558));
        assert!(failures.iter().all(|f| !f.succeeded));
    }

    #[test]
    fn test_log_eviction_at_cap() {
        let collector = MetricsCollector::new();
        for _ in 0..OUTCOME_LOG_CAP {
            collector.record(outcome(false, 1, 1));
        }
        // One more evicts the oldest instead of growing.
        collector.record(outcome(true, 1, 1));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, OUTCOME_LOG_CAP as u64);
        assert!(snapshot.success_rate > 0.0);
    }

    #[test]
    fn test_clear_empties_log() {
        let collector = MetricsCollector::new();
        collector.record(outcome(true, 1, 10));
        collector.clear();
        assert_eq!(collector.snapshot().total_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_writers() {
        use std::sync::Arc;

        let collector = Arc::new(MetricsCollector::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let collector = Arc::clone(&collector);
            handles.push(tokio::spawn(async move {
                collector.record(outcome(i % 2 == 0, 1, 5));
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 20);
        assert_eq!(snapshot.success_rate, 50.0);
    }
}
