//! Exponential backoff for transient LLM failures.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use crate::domain::errors::LlmError;
use crate::domain::models::config::RetryConfig;

/// Retry policy with exponential backoff for transient LLM errors
///
/// Retries network errors, timeouts, 429 and 5xx responses. Everything else
/// (bad request, auth, malformed body) fails immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    max_elapsed: Duration,
}

impl RetryPolicy {
    /// Policy with explicit backoff bounds.
    pub fn new(initial_backoff: Duration, max_backoff: Duration, max_elapsed: Duration) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            max_elapsed,
        }
    }

    /// Policy from configured milliseconds.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            Duration::from_millis(config.max_elapsed_ms),
        )
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(1), Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails permanently, or the elapsed
    /// budget is spent.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        if self.max_elapsed.is_zero() {
            return operation().await;
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        backoff::future::retry(policy, || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_transient() {
                        tracing::debug!(error = %e, "transient LLM error, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }
}
