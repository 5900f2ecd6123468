//! Bounded-attempt retry driver with exponential backoff.
//!
//! The policy is a small state machine: each attempt either succeeds,
//! fails retryably (sleep `base * 2^attempt`, try again while budget
//! remains), or fails fatally (return at once). Keeping the driver separate
//! from the I/O calls makes the policy testable without a network.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Total attempts before the last error is surfaced.
pub const MAX_ATTEMPTS: usize = 3;
/// Backoff base: 0.5s, then 1.0s between the three attempts.
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// Errors that can tell the driver whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `op` up to `max_attempts` times.
///
/// `op` receives the 0-indexed attempt number. Non-retryable errors return
/// immediately; after the final attempt the last error propagates unchanged.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: usize,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                let delay = base_delay * 2u32.pow(attempt as u32);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed: {}; retrying",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeError {
        retryable: bool,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_makes_three_calls() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(3, Duration::from_millis(500), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeError { retryable: true })
                } else {
                    Ok("answer")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_stops_at_the_attempt_cap() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(500), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: true }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_half_then_one_second() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = with_retry(3, Duration::from_millis(500), |_| async {
            Err(FakeError { retryable: true })
        })
        .await;
        // 0.5s after attempt 0, 1.0s after attempt 1, none after the last.
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_do_not_consume_retry_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(500), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError { retryable: false }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success_makes_one_call() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(3, Duration::from_millis(500), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FakeError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
