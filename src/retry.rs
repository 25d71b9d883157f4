//! Bounded retry with exponential backoff
//!
//! Each step of a run (fetch, upload) gets `max_attempts` tries. Only
//! errors that [`AppError::is_retryable`] accepts are tried again.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::AppError;

/// Retry policy for one step
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based)
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`, plus up to 10% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exponential = 2u64.saturating_pow(attempt - 1);
        let capped = base_ms.saturating_mul(exponential).min(max_ms);

        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// # Errors
    /// - the operation's own error if it is not retryable, or if only one
    ///   attempt was allowed
    /// - `AppError::RetriesExhausted` wrapping the last error otherwise
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) if attempt >= self.max_attempts => {
                    if self.max_attempts == 1 {
                        return Err(error);
                    }
                    return Err(AppError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
                Err(error) => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay = ?delay,
                        %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(1000));

        assert_eq!(policy.backoff(0), Duration::ZERO);
        let first = policy.backoff(1).as_millis();
        assert!((100..110).contains(&first));
        let second = policy.backoff(2).as_millis();
        assert!((200..220).contains(&second));
        let capped = policy.backoff(10).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn zero_attempts_become_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = fast_policy(3)
            .run("upload", move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Storage("slow down".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let error = fast_policy(5)
            .run("fetch", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::SourceResponse {
                    status: StatusCode::UNAUTHORIZED,
                    body: "bad credentials".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(error, AppError::SourceResponse { status, .. } if status == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn exhausted_attempts_wrap_the_last_error() {
        let error = fast_policy(3)
            .run("upload", |attempt| async move {
                Err::<(), _>(AppError::Storage(format!("attempt {}", attempt)))
            })
            .await
            .unwrap_err();

        match error {
            AppError::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "upload");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AppError::Storage(ref message) if message == "attempt 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_attempt_returns_the_error_unwrapped() {
        let error = RetryPolicy::none()
            .run("upload", |_| async {
                Err::<(), _>(AppError::Storage("denied".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(error, AppError::Storage(_)));
    }
}
