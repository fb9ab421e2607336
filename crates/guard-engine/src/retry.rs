//! Timeouts and bounded exponential backoff for collaborator calls.

use guard_core::error::{ExchangeError, NotifyError, StoreError};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry parameters for one kind of external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Deadline for each attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Errors the retry loop knows how to classify.
pub trait Retryable: fmt::Display {
    fn is_transient(&self) -> bool;

    /// The error to report when an attempt hits its deadline.
    fn timed_out() -> Self;

    /// Server-requested delay, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ExchangeError {
    fn is_transient(&self) -> bool {
        ExchangeError::is_transient(self)
    }

    fn timed_out() -> Self {
        ExchangeError::Timeout
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ExchangeError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl Retryable for NotifyError {
    fn is_transient(&self) -> bool {
        NotifyError::is_transient(self)
    }

    fn timed_out() -> Self {
        NotifyError::Timeout
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout | StoreError::Unavailable(_) | StoreError::Io(_)
        )
    }

    fn timed_out() -> Self {
        StoreError::Timeout
    }
}

/// Final failure of a retried call.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run one attempt under a deadline.
pub async fn with_timeout<T, E, Fut>(timeout: Duration, fut: Fut) -> Result<T, E>
where
    E: Retryable,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out()),
    }
}

/// Call `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, Exhausted<E>>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match with_timeout(policy.timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.backoff(attempt))
                    .min(policy.max_backoff);
                warn!(
                    call = what,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = fast_policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
        assert_eq!(policy.backoff(10), Duration::from_millis(100));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Exhausted<ExchangeError>> = retry(&fast_policy(), "fetch", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ExchangeError::Timeout)
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(), "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::AuthFailure("expired".into()))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.last, ExchangeError::AuthFailure("expired".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(&fast_policy(), "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::RateLimited { retry_after_secs: 1 })
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..fast_policy()
        };
        let result: Result<(), Exhausted<NotifyError>> = retry(&policy, "deliver", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err().last, NotifyError::Timeout);
    }
}
