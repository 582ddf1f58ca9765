use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::AppError;
use crate::fetch::FetchResult;

/// Bounded exponential backoff for a single outbound request. Only
/// transient-rate failures (429/503) are retried; anything else propagates
/// immediately. Carries no concurrency of its own — callers run it inside a
/// queue slot.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    pub async fn execute<T, F, Fut>(&self, mut request: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !err.is_transient() {
                        return Err(err);
                    }
                    let delay = self.initial_delay * 2u32.pow(attempt);
                    log::debug!(
                        "rate limited, retrying in {:?} (attempt {}/{}): {}",
                        delay,
                        attempt + 1,
                        self.max_retries,
                        err
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transient() -> AppError {
        AppError::Status(StatusCode::TOO_MANY_REQUESTS)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures_with_geometric_delays() {
        let policy = RetryPolicy::new(4, Duration::from_secs(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let start = Instant::now();
        let result = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 5s + 10s of backoff before the successful third attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_then_propagates() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: FetchResult<()> = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(result.is_err());
        // Initial attempt plus max_retries retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failures_are_not_retried() {
        let policy = RetryPolicy::new(4, Duration::from_secs(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let start = Instant::now();
        let result: FetchResult<()> = policy
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Status(StatusCode::INTERNAL_SERVER_ERROR))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
