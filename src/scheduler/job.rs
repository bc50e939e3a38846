//! Generation job model: parameters, lifecycle status and snapshots.

use crate::error::{ProgressError, SchedulerError};
use crate::orchestrator::Preferences;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};
use crate::recipe::Recipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-batch parameters supplied at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub owner_id: String,
    pub count: usize,
    #[serde(default = "default_serving_size")]
    pub serving_size: u32,
    #[serde(default)]
    pub preferences: Preferences,
    /// Ingredient that exactly one item of the batch must use.
    #[serde(default)]
    pub must_include: Option<String>,
    #[serde(default)]
    pub with_media: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_serving_size() -> u32 {
    4
}

impl JobParams {
    pub fn new(owner_id: impl Into<String>, count: usize) -> Self {
        Self {
            owner_id: owner_id.into(),
            count,
            serving_size: default_serving_size(),
            preferences: Preferences::default(),
            must_include: None,
            with_media: false,
            description: None,
        }
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.owner_id.trim().is_empty() {
            return Err(SchedulerError::InvalidParams("owner_id cannot be empty".to_string()));
        }
        if self.count == 0 {
            return Err(SchedulerError::InvalidParams("count must be at least 1".to_string()));
        }
        if self.serving_size == 0 {
            return Err(SchedulerError::InvalidParams(
                "serving_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{} recipes for {}", self.count, self.owner_id))
    }

    /// The must-include ingredient, ignoring blank values.
    pub fn must_include(&self) -> Option<&str> {
        self.must_include
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningPhase {
    Items,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running(RunningPhase),
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub owner_id: String,
    pub requested: usize,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    /// Accepted items so far, in batch order.
    pub items: Vec<Recipe>,
    pub result_ref: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn pending(id: &str, params: &JobParams) -> Self {
        Self {
            id: id.to_string(),
            owner_id: params.owner_id.clone(),
            requested: params.count,
            status: JobStatus::Pending,
            progress: 0,
            current_step: "Queued".to_string(),
            items: Vec::new(),
            result_ref: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running(RunningPhase::Items);
        self.started_at = Some(Utc::now());
        self.current_step = "Generating recipes".to_string();
    }

    pub(crate) fn complete(&mut self, result_ref: String) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result_ref = Some(result_ref);
        self.current_step = "Completed".to_string();
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.current_step = "Failed".to_string();
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    pub fn fallback_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_fallback()).count()
    }
}

/// Summary of a job that has not finished yet.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobInfo {
    pub id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub running: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Mirrors progress events into the job's snapshot before forwarding them.
///
/// Held only by the job's own task, so the snapshot keeps a single writer.
pub(crate) struct SnapshotSink {
    pub(crate) tx: Arc<watch::Sender<JobSnapshot>>,
    pub(crate) downstream: Arc<dyn ProgressSink>,
}

impl ProgressSink for SnapshotSink {
    fn emit(&self, event: &ProgressEvent) -> Result<(), ProgressError> {
        self.tx.send_modify(|snapshot| {
            snapshot.progress = snapshot.progress.max(event.percent);
            snapshot.current_step = event.message.clone();
            if event.phase == ProgressPhase::Media {
                snapshot.status = JobStatus::Running(RunningPhase::Media);
            }
        });
        self.downstream.emit(event)
    }
}
