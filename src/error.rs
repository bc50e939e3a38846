//! Error types for the Simmer batch recipe generation system.

use thiserror::Error;

/// Errors surfaced by the resilient call wrapper and the endpoints behind it.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("Circuit open for endpoint {endpoint}")]
    CircuitOpen { endpoint: String },

    #[error("Request to {endpoint} timed out after {after_ms}ms")]
    Timeout { endpoint: String, after_ms: u128 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Endpoint unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Request rejected (status {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Endpoint {endpoint} failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        endpoint: String,
        attempts: usize,
        last: Box<CallError>,
    },
}

impl CallError {
    /// Timeouts, connection failures and 5xx/429 responses are worth another attempt.
    /// Rejections (4xx, malformed payloads) and breaker refusals are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::Timeout { .. } | CallError::Connection(_) | CallError::Unavailable { .. }
        )
    }
}

/// Errors from the history collaborator.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Storage(String),

    #[error("History record encoding error: {0}")]
    Encoding(String),
}

impl From<sled::Error> for HistoryError {
    fn from(err: sled::Error) -> Self {
        HistoryError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for HistoryError {
    fn from(err: bincode::Error) -> Self {
        HistoryError::Encoding(err.to_string())
    }
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to store result for owner {owner_id}: {message}")]
    StoreFailed { owner_id: String, message: String },
}

/// Errors from a progress sink. Never fatal to a job.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Progress sink disconnected")]
    Disconnected,

    #[error("Progress sink error: {0}")]
    Sink(String),
}

/// Errors returned by the job scheduler's control surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Capacity exceeded: {running} jobs running and {queued} queued")]
    CapacityExceeded { running: usize, queued: usize },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} already finished")]
    AlreadyFinished(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Scheduler has not been started")]
    NotStarted,

    #[error("Timed out waiting for job {0}")]
    WaitTimeout(String),

    #[error("Invalid job parameters: {0}")]
    InvalidParams(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration validation failed:\n{0}")]
    Invalid(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Errors raised inside a job's execution; recorded verbatim on the job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Cancelled after {completed} of {requested} items")]
    Cancelled { completed: usize, requested: usize },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Scheduler shut down before the job started")]
    Drained,
}
