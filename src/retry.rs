//! Retry manager with exponential backoff
//!
//! Bounded retry for external calls:
//! - Only errors whose kind is retryable are retried
//! - Delay doubles per attempt, capped, with ±25% jitter
//! - `max_retries` counts retries, so an operation runs at most `max_retries + 1` times

use crate::errors::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default retries for pipeline stages
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default base delay (500 ms)
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap (16 seconds)
const MAX_DELAY_MS: u64 = 16_000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_RETRIES, BASE_DELAY_MS)
    }

    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Run `operation`, retrying retryable failures
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_notify(operation, |_, _| {}).await
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), calling `on_retry(attempt, error)` before each wait
    pub async fn execute_with_notify<F, Fut, T, N>(&self, mut operation: F, mut on_retry: N) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        N: FnMut(u32, &crate::errors::PipelineError),
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.max_retries {
                        return Err(e);
                    }

                    attempt += 1;
                    let delay = self.calculate_delay(attempt - 1);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    on_retry(attempt, &e);
                    sleep(delay).await;
                }
            }
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on time spent waiting between attempts (without jitter)
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (0..self.max_retries)
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt))
                    .min(self.max_delay_ms)
            })
            .sum();

        Duration::from_millis(total_ms)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let retry_manager = RetryManager::new();
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Ok::<i32, PipelineError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let retry_manager = RetryManager::with_config(1, 1);
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    let current = {
                        let mut attempts = count.lock().unwrap();
                        *attempts += 1;
                        *attempts
                    };

                    if current < 2 {
                        Err(PipelineError::GenerationUnavailable("503".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded_and_keep_last_error() {
        let retry_manager = RetryManager::with_config(2, 1);
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();
        let mut notified = Vec::new();

        let result = retry_manager
            .execute_with_notify(
                move || {
                    let count = count_clone.clone();
                    async move {
                        *count.lock().unwrap() += 1;
                        Err::<i32, _>(PipelineError::RetrievalUnavailable("down".to_string()))
                    }
                },
                |attempt, _| notified.push(attempt),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::RetrievalUnavailable(_))));
        assert_eq!(*attempt_count.lock().unwrap(), 3);
        assert_eq!(notified, vec![1, 2]);
    }

    #[test]
    fn test_non_retryable_error() {
        let retry_manager = RetryManager::with_config(3, 1);
        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = tokio_test::block_on(retry_manager.execute_with_retry(move || {
            let count = count_clone.clone();
            async move {
                *count.lock().unwrap() += 1;
                Err::<i32, _>(PipelineError::EmptyGeneration)
            }
        }));

        assert!(matches!(result, Err(PipelineError::EmptyGeneration)));
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[test]
    fn test_calculate_delay() {
        let retry_manager = RetryManager::with_config(5, 1000).without_jitter();

        assert_eq!(retry_manager.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(retry_manager.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(retry_manager.calculate_delay(4), Duration::from_millis(16000));
        assert_eq!(retry_manager.calculate_delay(10), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let retry_manager = RetryManager::with_config(1, 1000);
        for _ in 0..50 {
            let delay = retry_manager.calculate_delay(0).as_millis();
            assert!((750..=1250).contains(&delay));
        }
    }

    #[test]
    fn test_max_total_wait_time() {
        let retry_manager = RetryManager::with_config(5, 1000);
        assert_eq!(retry_manager.max_total_wait_time(), Duration::from_secs(31));
        assert_eq!(RetryManager::new().max_total_wait_time(), Duration::from_millis(500));
    }
}
