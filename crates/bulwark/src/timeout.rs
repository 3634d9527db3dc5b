//! Deadline enforcement for individual network attempts
//!
//! Races one attempt future against a timer. Whichever settles first is the
//! only observable outcome: a timed-out attempt future is dropped, which
//! aborts the underlying transfer (best-effort cancellation).

use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Wraps a single attempt with a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutController {
    timeout: Duration,
}

impl TimeoutController {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `attempt` to completion or until the deadline fires, whichever
    /// comes first. A fired deadline resolves to [`Error::Timeout`] and the
    /// attempt's late completion is discarded.
    pub async fn run<F, T>(&self, attempt: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::Timeout { timeout: self.timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_attempt_result_passes_through() {
        let controller = TimeoutController::new(Duration::from_secs(1));
        let result = tokio_test::block_on(async {
            controller.run(async { Ok::<_, Error>(42) }).await
        });
        assert_eq!(result.expect("attempt settles first"), 42);
    }

    #[test]
    fn test_attempt_error_passes_through() {
        let controller = TimeoutController::new(Duration::from_secs(1));
        let result = tokio_test::block_on(async {
            controller
                .run(async { Err::<(), _>(Error::InvalidConfiguration { message: "x".into() }) })
                .await
        });
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn test_slow_attempt_resolves_to_timeout() {
        let controller = TimeoutController::new(Duration::from_millis(20));
        let result = controller
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(())
            })
            .await;

        match result {
            Err(Error::Timeout { timeout }) => assert_eq!(timeout, Duration::from_millis(20)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    /// The late attempt's side effects after the deadline are never observed.
    #[tokio::test]
    async fn test_late_completion_is_discarded() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let completed = Arc::new(AtomicBool::new(false));
        let completed_clone = Arc::clone(&completed);

        let controller = TimeoutController::new(Duration::from_millis(10));
        let result = controller
            .run(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                completed_clone.store(true, Ordering::SeqCst);
                Ok::<_, Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!completed.load(Ordering::SeqCst), "dropped future must not run on");
    }
}
