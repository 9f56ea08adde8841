//! `execute_step_with_retry`: bounded retry with backoff around a single
//! durable step (§4.1, §7 category 1 transient failures).
//!
//! Grounded on `everruns-durable`'s `RetryPolicy`/`CircuitBreakerConfig` and
//! the teacher's `reqwest-middleware`-based retry posture (its HTTP client
//! stack assumes retryable transient failures at the provider boundary).

use std::future::Future;
use std::time::Duration;

use crate::error::AgentFlowError;

/// A bounded exponential backoff policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Multiplier applied to the backoff after each failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, used for operations with no meaningful
    /// transient-failure mode (e.g. pure CPU work).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }
}

/// Whether a given error is worth retrying. Only [`AgentFlowError::Model`]
/// is treated as transient; configuration, parsing, and step-limit errors
/// are retried-zero times regardless of `policy` since retrying them can
/// never succeed.
fn is_retryable(error: &AgentFlowError) -> bool {
    matches!(error, AgentFlowError::Model(_) | AgentFlowError::Store(_))
}

/// Run `operation`, retrying on transient failures up to `policy.max_attempts`
/// times with exponential backoff between attempts.
pub async fn execute_step_with_retry<F, Fut, T>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, AgentFlowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentFlowError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt + 1 < policy.max_attempts && is_retryable(&error) => {
                let backoff = policy.backoff_for(attempt);
                tracing::warn!(attempt, ?backoff, error = %error, "retrying durable step after transient failure");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            max_backoff: Duration::from_millis(5),
        };

        let result = execute_step_with_retry(policy, || {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    let err: Box<dyn std::error::Error + Send + Sync> = "transient".into();
                    Err(AgentFlowError::Model(err))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), AgentFlowError> = execute_step_with_retry(policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(AgentFlowError::Configuration("bad config".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
