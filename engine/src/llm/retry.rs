//! Bounded retry with exponential backoff for text generation calls
//!
//! Backoff doubles after each failed attempt, starting from the initial
//! delay and capped at the maximum. Only transient failures
//! (`LLMError::is_transient`) are retried; terminal failures return at once.
//! Every attempt runs under the caller's per-attempt timeout.

use super::LLMError;
use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry policy configuration for handling transient errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

/// How a retried operation ended
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    /// The operation succeeded on attempt number `attempts`
    Success { value: T, attempts: u32 },

    /// Every attempt failed with a transient error
    Exhausted { last_error: LLMError, attempts: u32 },

    /// A terminal error stopped retrying early
    Terminal { error: LLMError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    /// Collapse into a `Result`, keeping the attempt count on both sides
    pub fn into_result(self) -> Result<(T, u32), (LLMError, u32)> {
        match self {
            RetryOutcome::Success { value, attempts } => Ok((value, attempts)),
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => Err((last_error, attempts)),
            RetryOutcome::Terminal { error, attempts } => Err((error, attempts)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// `max_attempts` is clamped to at least 1 and `max_backoff_ms` to at
    /// least `initial_backoff_ms`.
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out
    ///
    /// An attempt exceeding `attempt_timeout` counts as `LLMError::Timeout`.
    pub async fn run<F, Fut, T>(&self, attempt_timeout: Duration, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let mut attempt = 0u32;

        loop {
            let result = match timeout(attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(LLMError::Timeout),
            };
            let attempts = attempt + 1;

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempts, "Operation succeeded after retry");
                    }
                    return RetryOutcome::Success { value, attempts };
                }
                Err(err) if !err.is_transient() => {
                    debug!(attempt = attempts, error = %err, "Terminal error, not retrying");
                    return RetryOutcome::Terminal {
                        error: err,
                        attempts,
                    };
                }
                Err(err) if attempts >= self.max_attempts => {
                    warn!(attempt = attempts, error = %err, "Retries exhausted");
                    return RetryOutcome::Exhausted {
                        last_error: err,
                        attempts,
                    };
                }
                Err(err) => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        attempt = attempts,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient error, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
