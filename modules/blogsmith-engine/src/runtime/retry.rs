//! Retry with exponential backoff and jitter. The base delay doubles each
//! attempt up to `max_delay`; a uniform factor in [0.5, 1.0] spreads
//! simultaneous retries apart. Non-recoverable errors short-circuit.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use super::classify::StageError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const API_CALLS: RetryPolicy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        multiplier: 2.0,
        max_delay: Duration::from_secs(30),
    };

    pub const URL_VALIDATION: RetryPolicy = RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_secs(1),
        multiplier: 2.0,
        max_delay: Duration::from_secs(10),
    };

    pub const IMAGE_GENERATION: RetryPolicy = RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_secs(5),
        multiplier: 2.0,
        max_delay: Duration::from_secs(60),
    };

    pub const CRITICAL_OPERATIONS: RetryPolicy = RetryPolicy {
        max_retries: 5,
        initial_delay: Duration::from_secs(1),
        multiplier: 2.0,
        max_delay: Duration::from_secs(120),
    };

    /// Base delay before retry number `attempt` (0-based), without jitter.
    /// Forms a non-decreasing sequence capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` with up to `policy.max_retries` retries after the initial
/// attempt. Returns the first success or the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            info!(op = op_name, attempt, max = policy.max_retries, "Retry attempt");
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.recoverable() {
                    error!(op = op_name, error = %e, "Non-recoverable error, not retrying");
                    return Err(e);
                }
                if attempt >= policy.max_retries {
                    error!(op = op_name, error = %e, "All retries exhausted");
                    last_error = Some(e);
                    break;
                }

                let base = policy.delay_for_attempt(attempt);
                let jitter: f64 = rand::rng().random_range(0.5..1.0);
                let delay = base.mul_f64(jitter);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StageError::internal("retry loop without attempts")))
}
