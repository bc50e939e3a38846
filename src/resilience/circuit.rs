//! Per-endpoint circuit breaker.
//!
//! One breaker is shared by every job that calls the same endpoint, so all state
//! transitions happen under the breaker's own mutex.

use crate::error::CallError;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

/// How a call was let through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single probe allowed while half-open.
    Trial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub status: CircuitStatus,
    pub failure_count: u32,
}

#[derive(Debug)]
struct CircuitState {
    status: CircuitStatus,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            state: Mutex::new(CircuitState {
                status: CircuitStatus::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Decide whether a call may proceed. Refusals perform no I/O.
    pub fn admit(&self) -> Result<Admission, CallError> {
        let mut state = self.state.lock();
        match state.status {
            CircuitStatus::Closed => Ok(Admission::Normal),
            CircuitStatus::Open => {
                let recovered = state
                    .last_failure
                    .map(|at| at.elapsed() >= self.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    state.status = CircuitStatus::HalfOpen;
                    state.trial_in_flight = true;
                    info!(endpoint = %self.endpoint, "Circuit half-open, allowing trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(self.open_error())
                }
            }
            CircuitStatus::HalfOpen => {
                if state.trial_in_flight {
                    Err(self.open_error())
                } else {
                    state.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    /// Only the trial's outcome moves a tripped circuit. A late success from a
    /// call admitted before the circuit opened leaves it as it is.
    pub fn record_success(&self, admission: Admission) {
        let mut state = self.state.lock();
        match (admission, state.status) {
            (Admission::Trial, _) => {
                info!(endpoint = %self.endpoint, "Circuit closed after successful trial");
                state.status = CircuitStatus::Closed;
                state.failure_count = 0;
                state.trial_in_flight = false;
            }
            (Admission::Normal, CircuitStatus::Closed) => state.failure_count = 0,
            (Admission::Normal, _) => {}
        }
    }

    /// A call ended in a retryable failure after exhausting its attempts.
    pub fn record_failure(&self, admission: Admission) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);

        if admission == Admission::Trial {
            state.status = CircuitStatus::Open;
            state.last_failure = Some(Instant::now());
            state.trial_in_flight = false;
            warn!(endpoint = %self.endpoint, "Trial call failed, circuit re-opened");
            return;
        }

        // Stale failures from before the circuit opened only add to the count.
        if state.status != CircuitStatus::Closed {
            return;
        }
        state.last_failure = Some(Instant::now());
        if state.failure_count >= self.failure_threshold {
            state.status = CircuitStatus::Open;
            warn!(
                endpoint = %self.endpoint,
                failure_count = state.failure_count,
                recovery_timeout_ms = self.recovery_timeout.as_millis(),
                "Circuit opened"
            );
        }
    }

    /// A call ended in a fatal (non-retryable) failure; health is unknown.
    pub fn record_inconclusive(&self, admission: Admission) {
        if admission == Admission::Trial {
            self.state.lock().trial_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            status: state.status,
            failure_count: state.failure_count,
        }
    }

    fn open_error(&self) -> CallError {
        CallError::CircuitOpen {
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Breakers keyed by endpoint identity, created on first use.
#[derive(Debug)]
pub struct CircuitRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(endpoint) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(endpoint.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                endpoint,
                self.failure_threshold,
                self.recovery_timeout,
            ))
        }))
    }

    pub fn snapshot(&self, endpoint: &str) -> Option<CircuitSnapshot> {
        self.breakers.read().get(endpoint).map(|b| b.snapshot())
    }
}
