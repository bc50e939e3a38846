//! End-to-end batch scenarios against stub endpoints
//!
//! Tests cover:
//! - Full fallback when the provider never answers
//! - Distinct techniques across a healthy batch
//! - Must-include placement
//! - Cancellation mid-batch
//! - Progress monotonicity

use super::test_utils::{quick_resilience, Harness, HarnessOptions, StubEndpoint, StubMode, WAIT};
use simmer::diversity::Axis;
use simmer::{ItemOrigin, JobParams, JobStatus};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn unresponsive_provider_yields_complete_fallback_batch() {
    // Default resilience settings: 60s per attempt, paused clock.
    let harness = Harness::new(StubEndpoint::new(StubMode::Hang));

    let job_id = harness.scheduler.submit(JobParams::new("owner-1", 3)).unwrap();
    let snapshot = harness
        .scheduler
        .wait_for_terminal(&job_id, Duration::from_secs(24 * 3600))
        .await
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.fallback_count(), 3);
    assert!(snapshot
        .items
        .iter()
        .all(|item| matches!(item.origin, ItemOrigin::Fallback { .. })));

    let stored = harness.results.get(snapshot.result_ref.as_deref().unwrap()).unwrap();
    assert_eq!(stored.items.len(), 3);
    assert_eq!(stored.metadata.fallback_count, 3);
    assert!(!stored.metadata.shopping_list.is_empty());

    // 3 items x 3 attempts opens the circuit on the last exhausted item only.
    assert_eq!(harness.endpoint.calls(), 9);
}

#[tokio::test]
async fn healthy_batch_uses_distinct_techniques() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed),
        HarnessOptions {
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    );

    let job_id = harness.scheduler.submit(JobParams::new("owner-2", 5)).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&job_id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.items.len(), 5);
    assert_eq!(snapshot.fallback_count(), 0);

    let techniques: HashSet<&str> = snapshot
        .items
        .iter()
        .map(|item| item.tags.as_ref().unwrap().technique.as_str())
        .collect();
    assert_eq!(techniques.len(), 5);
    assert!(techniques
        .iter()
        .all(|t| Axis::Technique.options().iter().any(|o| o == t)));
}

#[tokio::test]
async fn must_include_lands_in_exactly_one_item() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed),
        HarnessOptions {
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    );

    let mut params = JobParams::new("owner-3", 5);
    params.must_include = Some("tamarind".to_string());
    let job_id = harness.scheduler.submit(params).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&job_id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    let mentioning = snapshot
        .items
        .iter()
        .filter(|item| item.mentions_ingredient("tamarind"))
        .count();
    assert_eq!(mentioning, 1);

    let constrained_prompts = harness
        .endpoint
        .prompts()
        .iter()
        .filter(|p| p.contains("MUST include: tamarind"))
        .count();
    assert_eq!(constrained_prompts, 1);
}

#[tokio::test]
async fn must_include_survives_fallback() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::Gibberish),
        HarnessOptions {
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    );

    let mut params = JobParams::new("owner-3b", 4);
    params.must_include = Some("Black garlic".to_string());
    let job_id = harness.scheduler.submit(params).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&job_id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.fallback_count(), 4);
    let mentioning = snapshot
        .items
        .iter()
        .filter(|item| item.mentions_ingredient("black garlic"))
        .count();
    assert_eq!(mentioning, 1);
}

#[tokio::test]
async fn cancellation_after_third_item_keeps_partial_results() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed).with_delay(Duration::from_millis(40)),
        HarnessOptions {
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    );

    let job_id = harness.scheduler.submit(JobParams::new("owner-4", 10)).unwrap();
    let mut rx = harness.scheduler.subscribe(&job_id).unwrap();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.items.len() >= 3))
        .await
        .unwrap()
        .unwrap();
    harness.scheduler.cancel(&job_id).unwrap();

    let snapshot = harness.scheduler.wait_for_terminal(&job_id, WAIT).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!((3..=4).contains(&snapshot.items.len()));
    assert!(snapshot.error.as_deref().unwrap().starts_with("Cancelled after"));
    assert!(snapshot.result_ref.is_none());
    assert!(harness.results.is_empty());

    assert!(matches!(
        harness.scheduler.cancel(&job_id),
        Err(simmer::SchedulerError::AlreadyFinished(_))
    ));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed),
        HarnessOptions {
            resilience: quick_resilience(),
            ..HarnessOptions::default()
        },
    );

    let job_id = harness.scheduler.submit(JobParams::new("owner-5", 4)).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&job_id, WAIT).await.unwrap();
    assert_eq!(snapshot.progress, 100);

    let percents: Vec<u8> = harness
        .progress
        .events_for(&job_id)
        .iter()
        .map(|event| event.percent)
        .collect();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn invalid_parameters_are_rejected_at_submission() {
    let harness = Harness::new(StubEndpoint::new(StubMode::WellFormed));

    assert!(matches!(
        harness.scheduler.submit(JobParams::new("owner-6", 0)),
        Err(simmer::SchedulerError::InvalidParams(_))
    ));
    assert!(matches!(
        harness.scheduler.submit(JobParams::new("  ", 2)),
        Err(simmer::SchedulerError::InvalidParams(_))
    ));
    assert_eq!(harness.scheduler.stats().pending, 0);
}
