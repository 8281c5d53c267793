//! Whole-batch retry with exponential backoff.
//!
//! Only retryable failures are retried. A batch that failed committed nothing,
//! so each attempt starts over from a freshly read watermark.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use listing_facts_infra::{BatchReport, LastExecution, PipelineConfig, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retries: config.retry_attempts,
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before retry `retry` (1-based): base, 2×base, 4×base, ...
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor)
    }
}

/// Run `batch` until it succeeds, fails fatally, or retries are exhausted.
///
/// `batch` receives the 1-based attempt number.
pub async fn run_with_retry<F, Fut>(
    policy: RetryPolicy,
    last: &LastExecution,
    mut batch: F,
) -> Result<BatchReport, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<BatchReport, PipelineError>>,
{
    last.start();
    let mut attempt = 1;
    loop {
        last.attempt();
        match batch(attempt).await {
            Ok(report) => {
                info!(attempt, batch_id = %report.batch_id, "batch succeeded");
                last.succeed(report.clone());
                return Ok(report);
            }
            Err(err) if err.is_retryable() && attempt <= policy.retries => {
                let delay = policy.backoff(attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "batch failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(attempt, error = %err, retryable = err.is_retryable(), "batch failed");
                last.fail(err.to_string());
                return Err(err);
            }
        }
    }
}
