//! Progress reporting for generation jobs.
//!
//! Sinks are best-effort: a failing sink is logged and never fails the job.

pub mod event;

pub use event::{phase_percent, ProgressEvent, ProgressPhase};

use crate::error::ProgressError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use tracing::{info, warn};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent) -> Result<(), ProgressError>;
}

/// Emit an event, logging and discarding sink failures.
pub fn emit_best_effort(sink: &dyn ProgressSink, event: &ProgressEvent) {
    if let Err(err) = sink.emit(event) {
        warn!(job_id = %event.job_id, error = %err, "Progress sink failed");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: &ProgressEvent) -> Result<(), ProgressError> {
        Ok(())
    }
}

/// Writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn emit(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        info!(
            job_id = %event.job_id,
            phase = ?event.phase,
            current = event.current,
            total = event.total,
            percent = event.percent,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// In-process channel sink.
#[derive(Clone)]
pub struct ProgressBus {
    sender: Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new_pair() -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ProgressBus {
    fn emit(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.sender
            .send(event.clone())
            .map_err(|_| ProgressError::Disconnected)
    }
}

/// Keeps every event; used by tests and by callers that inspect a run afterwards.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn emit(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// One job's view of its sink. Percent never decreases across reports.
pub struct ProgressReporter {
    job_id: String,
    sink: Arc<dyn ProgressSink>,
    percent: AtomicU8,
}

impl ProgressReporter {
    pub fn new(job_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id: job_id.into(),
            sink,
            percent: AtomicU8::new(0),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Report at the current percent.
    pub fn note(&self, phase: ProgressPhase, current: usize, total: usize, message: impl Into<String>) {
        self.report(phase, current, total, self.percent(), message);
    }

    pub fn report(
        &self,
        phase: ProgressPhase,
        current: usize,
        total: usize,
        percent: u8,
        message: impl Into<String>,
    ) {
        let percent = self.percent.fetch_max(percent.min(100), Ordering::SeqCst).max(percent.min(100));
        let event = ProgressEvent::new(&self.job_id, phase, current, total, percent, message);
        emit_best_effort(self.sink.as_ref(), &event);
    }
}
