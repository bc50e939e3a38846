//! Optional media phase

use super::test_utils::{quick_resilience, Harness, HarnessOptions, StubEndpoint, StubMedia, StubMode, WAIT};
use simmer::progress::ProgressPhase;
use simmer::{JobParams, JobStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn media_harness(media: Arc<StubMedia>) -> Harness {
    Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed),
        HarnessOptions {
            resilience: quick_resilience(),
            media: Some(media),
            ..HarnessOptions::default()
        },
    )
}

fn stub_media(fail: bool) -> Arc<StubMedia> {
    Arc::new(StubMedia {
        fail,
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn media_phase_attaches_references_after_items() {
    let media = stub_media(false);
    let harness = media_harness(media.clone());

    let mut params = JobParams::new("owner-m", 2);
    params.with_media = true;
    let id = harness.scheduler.submit(params).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(media.calls.load(Ordering::SeqCst), 2);
    assert_eq!(snapshot.items[0].media_ref.as_deref(), Some("media://dish-1"));
    assert_eq!(snapshot.items[1].media_ref.as_deref(), Some("media://dish-2"));

    let events = harness.progress.events_for(&id);
    let last_item = events
        .iter()
        .filter(|e| e.phase == ProgressPhase::Items)
        .map(|e| e.percent)
        .max();
    assert_eq!(last_item, Some(50));
    assert!(events
        .iter()
        .any(|e| e.phase == ProgressPhase::Media && e.percent == 100));

    let stored = harness.results.get(snapshot.result_ref.as_deref().unwrap()).unwrap();
    assert!(stored.items.iter().all(|item| item.media_ref.is_some()));
}

#[tokio::test]
async fn media_failures_leave_items_without_references() {
    let media = stub_media(true);
    let harness = media_harness(media.clone());

    let mut params = JobParams::new("owner-m", 2);
    params.with_media = true;
    let id = harness.scheduler.submit(params).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100);
    assert!(snapshot.items.iter().all(|item| item.media_ref.is_none()));
    // Rejections are not retried.
    assert_eq!(media.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn media_is_skipped_unless_requested() {
    let media = stub_media(false);
    let harness = media_harness(media.clone());

    let id = harness.scheduler.submit(JobParams::new("owner-m", 2)).unwrap();
    let snapshot = harness.scheduler.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(media.calls.load(Ordering::SeqCst), 0);
    assert!(snapshot.items.iter().all(|item| item.media_ref.is_none()));
}
