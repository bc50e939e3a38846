//! Resilient call wrapper: circuit breaker plus bounded retry around any
//! external call, keyed by endpoint identity.
//!
//! Every outcome is classified through [`CallError::is_retryable`]. Retryable
//! failures back off and retry while attempts remain; fatal failures return at
//! once. A call that exhausts its attempts counts as one failure against the
//! endpoint's circuit.

pub mod circuit;
pub mod retry;

pub use circuit::{Admission, CircuitBreaker, CircuitRegistry, CircuitSnapshot, CircuitStatus};
pub use retry::RetryPolicy;

use crate::config::ResilienceConfig;
use crate::error::CallError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResilientCaller {
    policy: RetryPolicy,
    circuits: Arc<CircuitRegistry>,
}

impl ResilientCaller {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            policy: RetryPolicy::from(config),
            circuits: Arc::new(CircuitRegistry::new(
                config.failure_threshold,
                Duration::from_millis(config.recovery_timeout_ms),
            )),
        }
    }

    pub fn with_parts(policy: RetryPolicy, circuits: Arc<CircuitRegistry>) -> Self {
        Self { policy, circuits }
    }

    pub fn circuit_snapshot(&self, endpoint: &str) -> Option<CircuitSnapshot> {
        self.circuits.snapshot(endpoint)
    }

    /// Run `operation` against `endpoint` under the retry and circuit policy.
    ///
    /// `operation` is invoked once per attempt; each invocation is bounded by
    /// the per-attempt timeout, and an elapsed timeout is a retryable failure.
    pub async fn call<T, F, Fut>(&self, endpoint: &str, mut operation: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let breaker = self.circuits.breaker(endpoint);
        let admission = breaker.admit().map_err(|err| {
            debug!(endpoint, "Call refused by open circuit");
            err
        })?;

        // A half-open probe gets exactly one attempt.
        let max_attempts = match admission {
            Admission::Trial => 1,
            Admission::Normal => self.policy.max_attempts,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.policy.per_attempt_timeout, operation())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout {
                    endpoint: endpoint.to_string(),
                    after_ms: self.policy.per_attempt_timeout.as_millis(),
                }),
            };

            match outcome {
                Ok(value) => {
                    debug!(
                        endpoint,
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "External call succeeded"
                    );
                    breaker.record_success(admission);
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(endpoint, attempt, error = %err, "External call failed, not retrying");
                    breaker.record_inconclusive(admission);
                    return Err(err);
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        warn!(
                            endpoint,
                            attempts = attempt,
                            error = %err,
                            "External call exhausted retries"
                        );
                        breaker.record_failure(admission);
                        return Err(CallError::ExhaustedRetries {
                            endpoint: endpoint.to_string(),
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        endpoint,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "External call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
