//! Exponential backoff retry helper.
//!
//! Spec §5: "LLM and REST effectors retry with exponential backoff (base 250ms,
//! factor 2, cap 4, total ≤ 3 attempts) on transient errors (5xx, timeouts,
//! rate-limit). Retries do not extend the workflow-level deadline. Vector-db and
//! gateway effectors do not retry."

use std::future::Future;
use std::time::Duration;

use super::types::WorkflowError;

/// Backoff schedule for a retryable effector call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            factor: 2,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `attempt`th retry (0-indexed: the first retry, after
    /// the initial call, is attempt 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base * self.factor.saturating_pow(attempt)
    }
}

/// Whether a `WorkflowError` represents a transient failure eligible for retry.
pub fn is_retryable(err: &WorkflowError) -> bool {
    matches!(
        err,
        WorkflowError::EffectorTimeout { .. } | WorkflowError::EffectorTransient { .. }
    )
}

/// Runs `operation` up to `policy.max_attempts` times, sleeping with
/// exponential backoff between attempts, stopping at the first success or
/// the first non-retryable error.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < policy.max_attempts && is_retryable(&err) => {
                tracing::warn!(attempt, error = %err, "retrying after transient effector error");
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
