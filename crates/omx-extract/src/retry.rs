//! Per-request retry policy
//!
//! An explicit policy object invoked around each individual page request,
//! independent of the pagination logic: maximum attempt count, randomized
//! exponential backoff with an upper bound, and a retryable-error predicate
//! (see [`ExtractError::is_retryable`]).

use crate::error::{ExtractError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for one HTTP request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` waits up to `base_delay * 2^n`.
    pub base_delay: Duration,

    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(40),
        }
    }
}

impl RetryPolicy {
    /// Randomized exponential delay before retrying after `attempt` failures.
    ///
    /// Uniformly sampled from `[0, min(max_delay, base_delay * 2^attempt)]`
    /// so concurrent partitions hitting the same rate limit spread out.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self
            .base_delay
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }

    /// Run `op`, retrying transient failures up to the attempt ceiling.
    ///
    /// Non-retryable errors are returned immediately. Exhausting the budget
    /// converts the last transient error into [`ExtractError::RetriesExhausted`].
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(ExtractError::RetriesExhausted {
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(
                        error = %err,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_stays_below_ceiling() {
        let policy = RetryPolicy::default();
        for attempt in 0..12 {
            assert!(policy.backoff_delay(attempt) <= policy.max_delay);
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(10);
        let result: Result<u32> = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ExtractError::Transient("boom".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(10);
        let result: Result<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ExtractError::Rejected {
                        status: 404,
                        body: "not found".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(ExtractError::Rejected { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(3);
        let result: Result<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExtractError::Transient("still down".into())) }
            })
            .await;
        assert!(matches!(
            result,
            Err(ExtractError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
