//! Bounded retry with a fixed delay.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below one behave as one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `operation` until it succeeds, fails with an error that
    /// `is_retryable` rejects, or the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    warn!(operation = label, attempt, error = %err, "retrying after failure");
                    attempt += 1;
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[rstest]
    #[case(3, true, 3)]
    #[case(3, false, 1)]
    #[case(0, true, 1)]
    #[tokio::test(flavor = "multi_thread")]
    async fn run_stops_at_budget_or_permanent_error(
        #[case] max_attempts: u32,
        #[case] retryable: bool,
        #[case] expected_calls: u32,
    ) {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(max_attempts, Duration::ZERO);

        let result: Result<(), String> = policy
            .run(
                "test",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("boom".to_owned()) }
                },
                |_| retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn run_returns_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: Result<u32, String> = policy
            .run(
                "test",
                || {
                    let seen = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if seen < 2 {
                            Err("transient".to_owned())
                        } else {
                            Ok(seen)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(2));
    }
}
