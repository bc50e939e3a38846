//! Scheduler capacity and concurrency bounds

use super::test_utils::{quick_resilience, Gate, Harness, HarnessOptions, StubEndpoint, StubMode, WAIT};
use simmer::config::SchedulerConfig;
use simmer::{JobParams, JobStatus, SchedulerError};
use std::time::Duration;

fn scheduler_config(max_concurrent: usize, queue_capacity: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent,
        queue_capacity,
        ..SchedulerConfig::default()
    }
}

fn gated_harness(gate: &Gate, max_concurrent: usize, queue_capacity: usize) -> Harness {
    Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed).gated(gate),
        HarnessOptions {
            scheduler: scheduler_config(max_concurrent, queue_capacity),
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    )
}

#[tokio::test]
async fn at_most_max_concurrent_jobs_run() {
    let gate = Gate::new();
    let harness = gated_harness(&gate, 2, 10);

    let ids: Vec<String> = (0..3)
        .map(|i| harness.scheduler.submit(JobParams::new(format!("owner-{}", i), 2)).unwrap())
        .collect();

    // Let the first two reach the gated endpoint.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = harness.scheduler.stats();
    assert_eq!(stats.running, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(harness.scheduler.status(&ids[2]).unwrap().status, JobStatus::Pending);
    assert_eq!(harness.scheduler.active_jobs().len(), 3);

    gate.open();
    let mut snapshots = Vec::new();
    for id in &ids {
        snapshots.push(harness.scheduler.wait_for_terminal(id, WAIT).await.unwrap());
    }

    assert!(snapshots.iter().all(|s| s.status == JobStatus::Completed));
    assert!(harness.endpoint.max_in_flight() <= 2);

    let first_finish = snapshots[..2]
        .iter()
        .filter_map(|s| s.finished_at)
        .min()
        .unwrap();
    assert!(snapshots[2].started_at.unwrap() >= first_finish);
    assert_eq!(harness.scheduler.stats().completed, 3);
    assert!(harness.scheduler.active_jobs().is_empty());
}

#[tokio::test]
async fn submissions_beyond_capacity_fail_fast() {
    let gate = Gate::new();
    let harness = gated_harness(&gate, 1, 2);

    let accepted: Vec<String> = (0..3)
        .map(|i| harness.scheduler.submit(JobParams::new(format!("owner-{}", i), 1)).unwrap())
        .collect();

    match harness.scheduler.submit(JobParams::new("owner-overflow", 1)) {
        Err(SchedulerError::CapacityExceeded { running, queued }) => {
            assert_eq!(running, 1);
            assert_eq!(queued, 2);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }

    gate.open();
    for id in &accepted {
        let snapshot = harness.scheduler.wait_for_terminal(id, WAIT).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
    }

    // Capacity frees up once the backlog clears.
    let late = harness.scheduler.submit(JobParams::new("owner-late", 1)).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&late, WAIT).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
}

#[tokio::test]
async fn queued_jobs_emit_a_queued_event() {
    let gate = Gate::new();
    let harness = gated_harness(&gate, 1, 5);

    let _running = harness.scheduler.submit(JobParams::new("owner-a", 1)).unwrap();
    let queued = harness.scheduler.submit(JobParams::new("owner-b", 1)).unwrap();

    let events = harness.progress.events_for(&queued);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].phase, simmer::progress::ProgressPhase::Queued);

    harness.scheduler.cancel(&queued).unwrap();
    let snapshot = harness.scheduler.status(&queued).unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("Cancelled after 0 of 1 items"));

    gate.open();
    harness.scheduler.shutdown().await;
    assert!(matches!(
        harness.scheduler.submit(JobParams::new("owner-c", 1)),
        Err(SchedulerError::ShuttingDown)
    ));
}
