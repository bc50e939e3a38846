//! Event schema for job progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Queued,
    Items,
    Media,
    Persisting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: DateTime<Utc>,
    pub job_id: String,
    pub phase: ProgressPhase,
    /// 1-based position within the phase; 0 before the first item.
    pub current: usize,
    pub total: usize,
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        job_id: impl Into<String>,
        phase: ProgressPhase,
        current: usize,
        total: usize,
        percent: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            job_id: job_id.into(),
            phase,
            current,
            total,
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

/// `round(done / total * span) + start`, clamped to 100.
pub fn phase_percent(start: u8, span: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return start.saturating_add(span).min(100);
    }
    let fraction = done.min(total) as f64 / total as f64;
    let value = start as f64 + (fraction * span as f64).round();
    value.min(100.0) as u8
}
