use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

// Attempts and backoff sleeps are both bounded by `deadline`.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    deadline: Instant,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 1;
    loop {
        let err = match timeout_at(deadline, op()).await {
            Err(_) => return Err(FetchError::DeadlineExceeded),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
        };
        if !err.is_retryable() || attempt >= policy.max_attempts {
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            label, attempt, policy.max_attempts, err, delay
        );
        if timeout_at(deadline, tokio::time::sleep(delay)).await.is_err() {
            return Err(FetchError::DeadlineExceeded);
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> FetchError {
        FetchError::Status {
            url: "http://upstream".to_string(),
            status: 502,
            body: "bad gateway".to_string(),
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures_with_two_sleeps() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let result = with_backoff(policy, far_deadline(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_budget_is_spent() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let result: Result<(), _> = with_backoff(policy, far_deadline(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_decode_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let result: Result<(), _> = with_backoff(policy, far_deadline(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Decode {
                    url: "http://upstream".to_string(),
                    source: serde_json::from_str::<serde_json::Value>("[").unwrap_err(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Decode { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_backoff_short() {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(1500);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let result: Result<(), _> = with_backoff(policy, deadline, "test", || async {
            Err(transient())
        })
        .await;

        assert!(matches!(result, Err(FetchError::DeadlineExceeded)));
        // Gave up when the deadline fired during the second backoff, not after it.
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_a_hanging_attempt() {
        let deadline = Instant::now() + Duration::from_secs(2);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let result: Result<(), _> = with_backoff(policy, deadline, "test", || async {
            std::future::pending::<Result<(), FetchError>>().await
        })
        .await;
        assert!(result.unwrap_err().is_deadline());
    }

    #[test]
    fn delay_grows_with_attempt_index() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
    }
}
