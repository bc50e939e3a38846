//! Circuit breaker behavior as seen through whole batches

use super::test_utils::{Harness, HarnessOptions, StubEndpoint, StubMode};
use simmer::config::ResilienceConfig;
use simmer::{ItemOrigin, JobParams, JobStatus};
use std::time::Duration;

fn single_attempt() -> ResilienceConfig {
    ResilienceConfig {
        max_attempts: 1,
        per_attempt_timeout_ms: 1_000,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
        failure_threshold: 3,
        recovery_timeout_ms: 30_000,
    }
}

const LONG_WAIT: Duration = Duration::from_secs(3600);

#[tokio::test(start_paused = true)]
async fn open_circuit_skips_the_endpoint_until_recovery() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::ConnectionRefused),
        HarnessOptions {
            resilience: single_attempt(),
            ..HarnessOptions::default()
        },
    );

    let job_id = harness.scheduler.submit(JobParams::new("owner-cb", 5)).unwrap();
    let snapshot = harness
        .scheduler
        .wait_for_terminal(&job_id, LONG_WAIT)
        .await
        .unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.fallback_count(), 5);
    assert_eq!(harness.endpoint.calls(), 3);
    for item in &snapshot.items[3..] {
        match &item.origin {
            ItemOrigin::Fallback { reason } => assert!(reason.contains("Circuit open"), "{}", reason),
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    // Still open before the recovery timeout.
    harness.endpoint.set_mode(StubMode::WellFormed);
    tokio::time::advance(Duration::from_secs(10)).await;
    let early = harness.scheduler.submit(JobParams::new("owner-cb", 1)).unwrap();
    let early = harness.scheduler.wait_for_terminal(&early, LONG_WAIT).await.unwrap();
    assert_eq!(early.fallback_count(), 1);
    assert_eq!(harness.endpoint.calls(), 3);

    // A successful trial closes the circuit for the rest of the batch.
    tokio::time::advance(Duration::from_secs(31)).await;
    let recovered = harness.scheduler.submit(JobParams::new("owner-cb", 2)).unwrap();
    let recovered = harness
        .scheduler
        .wait_for_terminal(&recovered, LONG_WAIT)
        .await
        .unwrap();
    assert_eq!(recovered.fallback_count(), 0);
    assert_eq!(harness.endpoint.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn unparseable_answers_do_not_trip_the_circuit() {
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::Gibberish),
        HarnessOptions {
            resilience: single_attempt(),
            ..HarnessOptions::default()
        },
    );

    let job_id = harness.scheduler.submit(JobParams::new("owner-parse", 5)).unwrap();
    let snapshot = harness
        .scheduler
        .wait_for_terminal(&job_id, LONG_WAIT)
        .await
        .unwrap();

    // Unparseable answers are successful calls; every item reached the endpoint.
    assert_eq!(snapshot.fallback_count(), 5);
    assert_eq!(harness.endpoint.calls(), 5);
}
