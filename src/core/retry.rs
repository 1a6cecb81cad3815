//! Retry logic for step invocation.
//!
//! Step retries are immediate: a failed attempt is followed straight away by
//! the next one until the attempt budget runs out or the error is permanent.

use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_attempts: u32,

    /// Timeout for each individual attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryConfig {
    /// Create a config that retries immediately, bounding each attempt.
    pub fn immediate(retries: u32, attempt_timeout: Option<Duration>) -> Self {
        Self { max_attempts: retries, attempt_timeout }
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error).
    pub result: Result<T, E>,

    /// Number of attempts made.
    pub attempts: u32,
}

/// Retry an async operation while `should_retry` accepts its error.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_async<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let max_attempts = config.max_attempts.saturating_add(1); // +1 for initial attempt

    loop {
        attempts += 1;
        let result = operation(attempts).await;

        let done = match &result {
            Ok(_) => true,
            Err(e) => attempts >= max_attempts || !should_retry(e),
        };
        if done {
            return RetryResult { result, attempts };
        }
    }
}
