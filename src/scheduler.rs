//! Batch job scheduler.
//!
//! Jobs are accepted synchronously and run on a pool of at most
//! `max_concurrent` driver tasks. Each driver holds one semaphore permit; when
//! its job finishes it takes the next queued job with the same permit, so the
//! hand-off and the release both happen under the scheduler lock and a queued
//! job is never stranded next to a free slot.
//!
//! A job's snapshot is written only by the task running it (or, for a queued
//! job, by whoever removes it from the queue). Observers read it through a
//! `watch` channel.

pub mod job;

pub use job::{ActiveJobInfo, JobParams, JobSnapshot, JobStatus, RunningPhase, SchedulerStats};

use crate::config::SchedulerConfig;
use crate::diversity::DiversityState;
use crate::error::{JobError, SchedulerError};
use crate::orchestrator::{GenerationOrchestrator, ItemRequest};
use crate::persistence::{PersistenceCollaborator, ResultMetadata};
use crate::progress::{
    emit_best_effort, phase_percent, ProgressEvent, ProgressPhase, ProgressReporter, ProgressSink,
};
use crate::provider::MediaGenerationEndpoint;
use crate::shopping_list::consolidate;
use chrono::Utc;
use job::SnapshotSink;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a job needs besides its parameters.
pub struct Collaborators {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub persistence: Arc<dyn PersistenceCollaborator>,
    pub media: Option<Arc<dyn MediaGenerationEndpoint>>,
    pub progress: Arc<dyn ProgressSink>,
}

struct JobEntry {
    params: Arc<JobParams>,
    cancel: CancellationToken,
    snapshot: watch::Receiver<JobSnapshot>,
}

struct QueuedJob {
    id: String,
    params: Arc<JobParams>,
    cancel: CancellationToken,
    tx: watch::Sender<JobSnapshot>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<String, JobEntry>,
    pending: VecDeque<QueuedJob>,
    started: bool,
    shutting_down: bool,
    housekeeping: Option<JoinHandle<()>>,
}

struct Inner {
    config: SchedulerConfig,
    collaborators: Collaborators,
    slots: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, collaborators: Collaborators) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                slots: Arc::new(Semaphore::new(max_concurrent)),
                state: Mutex::new(SchedulerState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start the housekeeping task. Must be called from within a runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return Err(SchedulerError::ShuttingDown);
        }
        if state.started {
            return Ok(());
        }
        state.started = true;
        let inner = Arc::clone(&self.inner);
        state.housekeeping = Some(tokio::spawn(housekeeping_loop(inner)));
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            queue_capacity = self.inner.config.queue_capacity,
            "Job scheduler started"
        );
        Ok(())
    }

    /// Accept a job. Starts it at once if a slot is free, otherwise queues it;
    /// fails fast when the queue is full.
    pub fn submit(&self, params: JobParams) -> Result<String, SchedulerError> {
        params.validate()?;

        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return Err(SchedulerError::ShuttingDown);
        }
        if !state.started {
            return Err(SchedulerError::NotStarted);
        }

        let id = format!("job-{}", uuid::Uuid::new_v4());
        let params = Arc::new(params);
        let (tx, rx) = watch::channel(JobSnapshot::pending(&id, &params));
        let cancel = CancellationToken::new();
        let queued = QueuedJob {
            id: id.clone(),
            params: Arc::clone(&params),
            cancel: cancel.clone(),
            tx,
        };

        match Arc::clone(&self.inner.slots).try_acquire_owned() {
            Ok(permit) => {
                state.jobs.insert(
                    id.clone(),
                    JobEntry {
                        params: Arc::clone(&params),
                        cancel,
                        snapshot: rx,
                    },
                );
                info!(job_id = %id, owner_id = %params.owner_id, count = params.count, "Job submitted");
                tokio::spawn(drive(Arc::clone(&self.inner), queued, permit));
            }
            Err(_) => {
                if state.pending.len() >= self.inner.config.queue_capacity {
                    let running = self.inner.running_count();
                    warn!(
                        owner_id = %params.owner_id,
                        running,
                        queued = state.pending.len(),
                        "Job rejected, capacity exceeded"
                    );
                    return Err(SchedulerError::CapacityExceeded {
                        running,
                        queued: state.pending.len(),
                    });
                }
                state.jobs.insert(
                    id.clone(),
                    JobEntry {
                        params: Arc::clone(&params),
                        cancel,
                        snapshot: rx,
                    },
                );
                state.pending.push_back(queued);
                let position = state.pending.len();
                info!(job_id = %id, owner_id = %params.owner_id, position, "Job queued");
                emit_best_effort(
                    self.inner.collaborators.progress.as_ref(),
                    &ProgressEvent::new(
                        &id,
                        ProgressPhase::Queued,
                        0,
                        params.count,
                        0,
                        format!("Queued at position {}", position),
                    ),
                );
            }
        }

        Ok(id)
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, SchedulerError> {
        let state = self.inner.state.lock();
        state
            .jobs
            .get(job_id)
            .map(|entry| entry.snapshot.borrow().clone())
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }

    /// Watch a job's snapshot as it changes.
    pub fn subscribe(&self, job_id: &str) -> Result<watch::Receiver<JobSnapshot>, SchedulerError> {
        let state = self.inner.state.lock();
        state
            .jobs
            .get(job_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }

    /// Cooperative cancellation. A queued job fails immediately; a running job
    /// stops at its next item boundary.
    pub fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock();
        let entry = state
            .jobs
            .get(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        if entry.snapshot.borrow().status.is_terminal() {
            return Err(SchedulerError::AlreadyFinished(job_id.to_string()));
        }
        entry.cancel.cancel();

        if let Some(index) = state.pending.iter().position(|job| job.id == job_id) {
            if let Some(queued) = state.pending.remove(index) {
                let reason = JobError::Cancelled {
                    completed: 0,
                    requested: queued.params.count,
                };
                queued.tx.send_modify(|s| s.fail(reason.to_string()));
                info!(job_id, "Queued job cancelled");
            }
        } else {
            info!(job_id, "Cancellation requested");
        }
        Ok(())
    }

    /// Wait until the job is Completed or Failed.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<JobSnapshot, SchedulerError> {
        let mut rx = self.subscribe(job_id)?;
        // A closed channel means the writer is gone; its last value is final.
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| s.status.is_terminal()))
            .await
            .is_ok();
        if !reached {
            return Err(SchedulerError::WaitTimeout(job_id.to_string()));
        }
        let snapshot = rx.borrow().clone();
        Ok(snapshot)
    }

    pub fn active_jobs(&self) -> Vec<ActiveJobInfo> {
        let state = self.inner.state.lock();
        let mut active: Vec<ActiveJobInfo> = state
            .jobs
            .iter()
            .filter_map(|(id, entry)| {
                let snapshot = entry.snapshot.borrow();
                (!snapshot.status.is_terminal()).then(|| ActiveJobInfo {
                    id: id.clone(),
                    owner_id: snapshot.owner_id.clone(),
                    status: snapshot.status,
                    progress: snapshot.progress,
                    created_at: snapshot.created_at,
                    description: entry.params.describe(),
                })
            })
            .collect();
        active.sort_by_key(|info| info.created_at);
        active
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock();
        let mut stats = SchedulerStats::default();
        for entry in state.jobs.values() {
            match entry.snapshot.borrow().status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running(_) => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Run one housekeeping sweep now; returns how many finished jobs were dropped.
    pub fn sweep_finished(&self) -> usize {
        self.inner.sweep()
    }

    /// Drain the queue, cancel running jobs, wait for each up to the shutdown
    /// timeout, then stop housekeeping.
    pub async fn shutdown(&self) {
        let (drained, running, housekeeping) = {
            let mut state = self.inner.state.lock();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            let drained: Vec<QueuedJob> = state.pending.drain(..).collect();
            let running: Vec<(String, watch::Receiver<JobSnapshot>)> = state
                .jobs
                .iter()
                .filter(|(_, entry)| !entry.snapshot.borrow().status.is_terminal())
                .filter(|(id, _)| !drained.iter().any(|q| &q.id == *id))
                .map(|(id, entry)| {
                    entry.cancel.cancel();
                    (id.clone(), entry.snapshot.clone())
                })
                .collect();
            (drained, running, state.housekeeping.take())
        };

        info!(
            drained = drained.len(),
            running = running.len(),
            "Job scheduler shutting down"
        );

        for queued in drained {
            queued
                .tx
                .send_modify(|s| s.fail(JobError::Drained.to_string()));
        }

        let wait = Duration::from_millis(self.inner.config.shutdown_wait_ms);
        for (job_id, mut rx) in running {
            if tokio::time::timeout(wait, rx.wait_for(|s| s.status.is_terminal()))
                .await
                .is_err()
            {
                warn!(job_id = %job_id, wait_ms = wait.as_millis() as u64, "Job did not stop before shutdown timeout");
            }
        }

        self.inner.shutdown.cancel();
        if let Some(handle) = housekeeping {
            let _ = handle.await;
        }
        info!("Job scheduler stopped");
    }
}

impl Inner {
    fn running_count(&self) -> usize {
        self.config
            .max_concurrent
            .max(1)
            .saturating_sub(self.slots.available_permits())
    }

    fn sweep(&self) -> usize {
        let retention = chrono::Duration::milliseconds(self.config.job_retention_ms as i64);
        let cutoff = Utc::now() - retention;
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.retain(|_, entry| {
            let snapshot = entry.snapshot.borrow();
            !(snapshot.status.is_terminal()
                && snapshot.finished_at.map_or(false, |at| at <= cutoff))
        });
        let removed = before - state.jobs.len();
        if removed > 0 {
            debug!(removed, remaining = state.jobs.len(), "Housekeeping removed finished jobs");
        }
        if removed > self.config.gc_hint_threshold {
            state.jobs.shrink_to_fit();
            state.pending.shrink_to_fit();
            debug!(removed, "Reclaimed job table capacity");
        }
        removed
    }
}

async fn housekeeping_loop(inner: Arc<Inner>) {
    let period = Duration::from_millis(inner.config.housekeeping_interval_ms.max(1));
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = interval.tick() => {
                inner.sweep();
            }
        }
    }
    debug!("Housekeeping stopped");
}

/// Runs jobs on one slot until the queue is empty.
async fn drive(inner: Arc<Inner>, first: QueuedJob, permit: OwnedSemaphorePermit) {
    let mut job = first;
    loop {
        run_job(&inner, job).await;

        let mut state = inner.state.lock();
        let next = if state.shutting_down {
            None
        } else {
            state.pending.pop_front()
        };
        match next {
            Some(queued) => job = queued,
            None => {
                // Released under the lock so a concurrent submit either sees
                // the free slot or queues before this check.
                drop(permit);
                break;
            }
        }
    }
}

async fn run_job(inner: &Arc<Inner>, job: QueuedJob) {
    let QueuedJob {
        id,
        params,
        cancel,
        tx,
    } = job;
    let tx = Arc::new(tx);
    tx.send_modify(|s| s.start());
    info!(job_id = %id, owner_id = %params.owner_id, count = params.count, "Job started");

    let worker = tokio::spawn(execute(
        Arc::clone(inner),
        id.clone(),
        Arc::clone(&params),
        cancel,
        Arc::clone(&tx),
    ));

    let outcome = match worker.await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(JobError::Panicked(message))
        }
        Err(join_error) => Err(JobError::Panicked(join_error.to_string())),
    };

    let progress = inner.collaborators.progress.as_ref();
    match outcome {
        Ok(result_ref) => {
            tx.send_modify(|s| s.complete(result_ref.clone()));
            info!(job_id = %id, result_ref = %result_ref, "Job completed");
            emit_best_effort(
                progress,
                &ProgressEvent::new(
                    &id,
                    ProgressPhase::Completed,
                    params.count,
                    params.count,
                    100,
                    "Completed",
                ),
            );
        }
        Err(err) => {
            let message = err.to_string();
            let percent = tx.borrow().progress;
            tx.send_modify(|s| s.fail(message.clone()));
            match err {
                JobError::Cancelled { .. } => info!(job_id = %id, reason = %message, "Job cancelled"),
                _ => error!(job_id = %id, error = %message, "Job failed"),
            }
            emit_best_effort(
                progress,
                &ProgressEvent::new(&id, ProgressPhase::Failed, 0, params.count, percent, message),
            );
        }
    }
}

async fn execute(
    inner: Arc<Inner>,
    job_id: String,
    params: Arc<JobParams>,
    cancel: CancellationToken,
    tx: Arc<watch::Sender<JobSnapshot>>,
) -> Result<String, JobError> {
    let collaborators = &inner.collaborators;
    let orchestrator = &collaborators.orchestrator;
    let reporter = ProgressReporter::new(
        &job_id,
        Arc::new(SnapshotSink {
            tx: Arc::clone(&tx),
            downstream: Arc::clone(&collaborators.progress),
        }),
    );

    let total = params.count;
    let media = collaborators.media.as_ref().filter(|_| params.with_media);
    let item_span = if media.is_some() { 50 } else { 100 };
    let must_include = params.must_include();
    let must_include_position = must_include.map(|_| rand::thread_rng().gen_range(1..=total));
    let mut state = DiversityState::for_batch(total, orchestrator.diversity_config());
    let mut items = Vec::with_capacity(total);

    reporter.report(ProgressPhase::Items, 0, total, 0, "Generating recipes");

    for position in 1..=total {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled {
                completed: items.len(),
                requested: total,
            });
        }

        let request = ItemRequest {
            owner_id: &params.owner_id,
            position,
            total,
            serving_size: params.serving_size,
            preferences: &params.preferences,
            must_include: must_include.filter(|_| must_include_position == Some(position)),
        };
        let recipe = orchestrator
            .generate_item(&request, &mut state, &reporter)
            .await;
        let name = recipe.name.clone();
        let fallback = recipe.is_fallback();
        items.push(recipe.clone());
        tx.send_modify(|s| s.items.push(recipe));

        debug!(job_id = %job_id, item = position, fallback, "Item accepted");
        reporter.report(
            ProgressPhase::Items,
            position,
            total,
            phase_percent(0, item_span, position, total),
            format!("Generated recipe {}/{}: {}", position, total, name),
        );
    }

    if let Some(media) = media {
        for (index, item) in items.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled {
                    completed: total,
                    requested: total,
                });
            }
            item.media_ref = orchestrator.generate_media(media.as_ref(), item).await;
            let media_ref = item.media_ref.clone();
            tx.send_modify(|s| {
                if let Some(stored) = s.items.get_mut(index) {
                    stored.media_ref = media_ref;
                }
            });
            reporter.report(
                ProgressPhase::Media,
                index + 1,
                total,
                phase_percent(50, 50, index + 1, total),
                format!("Generated image {}/{}", index + 1, total),
            );
        }
    }

    reporter.note(ProgressPhase::Persisting, total, total, "Saving results");
    let metadata = ResultMetadata {
        job_id: job_id.clone(),
        requested: total,
        fallback_count: items.iter().filter(|i| i.is_fallback()).count(),
        flagged_count: items.iter().filter(|i| i.is_flagged()).count(),
        shopping_list: consolidate(&items),
        created_at: Utc::now(),
    };
    let result_ref = collaborators
        .persistence
        .create_result(&params.owner_id, &items, &metadata)
        .await?;
    Ok(result_ref)
}
