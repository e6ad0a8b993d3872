//! Per-service circuit breakers. A breaker opens after N consecutive
//! failures; while open, calls fail fast until `recovery_timeout` elapses,
//! then a single trial runs half-open. Trial success closes the breaker and
//! resets the counter; trial failure re-opens it.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::classify::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold,
            recovery_timeout,
            state: Mutex::new(BreakerState {
                phase: BreakerPhase::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    pub async fn phase(&self) -> BreakerPhase {
        self.state.lock().await.phase
    }

    /// Run `op` under the breaker. Fails fast with [`StageError::BreakerOpen`]
    /// while open.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, StageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        {
            let mut state = self.state.lock().await;
            if state.phase == BreakerPhase::Open {
                let since_failure = state.last_failure.map(|t| t.elapsed()).unwrap_or_default();
                if since_failure < self.recovery_timeout {
                    return Err(StageError::BreakerOpen(self.name.clone()));
                }
                state.phase = BreakerPhase::HalfOpen;
                info!(breaker = %self.name, "Circuit breaker half-open, allowing trial request");
            }
        }

        match op().await {
            Ok(value) => {
                let mut state = self.state.lock().await;
                if state.phase == BreakerPhase::HalfOpen {
                    info!(breaker = %self.name, "Circuit breaker closed");
                }
                state.phase = BreakerPhase::Closed;
                state.consecutive_failures = 0;
                Ok(value)
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                state.consecutive_failures += 1;
                state.last_failure = Some(Instant::now());
                if state.phase == BreakerPhase::HalfOpen
                    || state.consecutive_failures >= self.failure_threshold
                {
                    if state.phase != BreakerPhase::Open {
                        warn!(
                            breaker = %self.name,
                            failures = state.consecutive_failures,
                            "Circuit breaker opened"
                        );
                    }
                    state.phase = BreakerPhase::Open;
                }
                Err(e)
            }
        }
    }
}

/// Process-global breakers, keyed by external service identity.
pub struct Breakers {
    pub generator: CircuitBreaker,
    pub image: CircuitBreaker,
    pub url_validation: CircuitBreaker,
}

impl Default for Breakers {
    fn default() -> Self {
        // Short recovery timeouts: job containers are recycled aggressively.
        Self {
            generator: CircuitBreaker::new("generator", 5, Duration::from_secs(30)),
            image: CircuitBreaker::new("image", 3, Duration::from_secs(30)),
            url_validation: CircuitBreaker::new("url_validation", 10, Duration::from_secs(15)),
        }
    }
}
