use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Statuses treated as transient by default: rate limiting and gateway or
/// server failures.
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors the retry policy knows how to classify.
pub trait RetryableError {
    /// HTTP status carried by the error, if the server answered at all.
    fn status(&self) -> Option<u16>;
    /// True for faults below HTTP: timeouts, refused connections, resets.
    fn is_transport(&self) -> bool;
}

/// Bounded retry with linearly increasing backoff (`base_delay * attempt`).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
            retryable_statuses: TRANSIENT_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn should_retry<E: RetryableError>(&self, error: &E) -> bool {
        match error.status() {
            Some(status) => self.retryable_statuses.contains(&status),
            None => error.is_transport(),
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt ceiling
    /// is reached. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: RetryableError + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && self.should_retry(&e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{label} attempt {attempt}/{attempts} failed ({e}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    enum FakeError {
        Status(u16),
        Timeout,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl RetryableError for FakeError {
        fn status(&self) -> Option<u16> {
            match self {
                FakeError::Status(s) => Some(*s),
                FakeError::Timeout => None,
            }
        }

        fn is_transport(&self) -> bool {
            matches!(self, FakeError::Timeout)
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_status_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<u32, FakeError> = policy
            .run("fake", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(FakeError::Status(429))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_ceiling() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), FakeError> = policy
            .run("fake", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Timeout)
            })
            .await;
        assert!(matches!(result, Err(FakeError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), FakeError> = policy
            .run("fake", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Status(401))
            })
            .await;
        assert!(matches!(result, Err(FakeError::Status(401))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
