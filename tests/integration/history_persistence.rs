//! Cross-batch history on the sled-backed store

use super::test_utils::{quick_resilience, Harness, HarnessOptions, StubEndpoint, StubMode, WAIT};
use simmer::history::{HistoryStore, SledHistoryStore};
use simmer::{JobParams, JobStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn sled_harness(temp_dir: &TempDir, window: usize) -> Harness {
    let store = SledHistoryStore::open(temp_dir.path().join("history")).unwrap();
    Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed),
        HarnessOptions {
            resilience: quick_resilience(),
            history: Some(Arc::new(store)),
            history_window: window,
            ..HarnessOptions::default()
        },
    )
}

#[tokio::test]
async fn history_is_bounded_and_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let harness = sled_harness(&temp_dir, 4);

    for _ in 0..2 {
        let id = harness.scheduler.submit(JobParams::new("owner-h", 3)).unwrap();
        let snapshot = harness.scheduler.wait_for_terminal(&id, WAIT).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
    }

    let records = harness.history.query_recent("owner-h", 100).await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
    // The stub numbers dishes by call; the newest is the sixth.
    assert_eq!(records[0].name, "Dish 6");
    assert!(records.iter().all(|r| r.fingerprint.len() == 32));
}

#[tokio::test]
async fn next_batch_avoids_recent_history() {
    let temp_dir = TempDir::new().unwrap();
    let harness = sled_harness(&temp_dir, 30);

    let first = harness.scheduler.submit(JobParams::new("owner-h", 3)).unwrap();
    let first = harness.scheduler.wait_for_terminal(&first, WAIT).await.unwrap();
    let used: HashSet<String> = first
        .items
        .iter()
        .map(|item| item.tags.as_ref().unwrap().technique.clone())
        .collect();

    let second = harness.scheduler.submit(JobParams::new("owner-h", 1)).unwrap();
    let second = harness.scheduler.wait_for_terminal(&second, WAIT).await.unwrap();
    let technique = &second.items[0].tags.as_ref().unwrap().technique;
    assert!(!used.contains(technique), "{} was used last batch", technique);
}

#[tokio::test]
async fn owners_do_not_share_history() {
    let temp_dir = TempDir::new().unwrap();
    let harness = sled_harness(&temp_dir, 30);

    let id = harness.scheduler.submit(JobParams::new("owner-a", 2)).unwrap();
    harness.scheduler.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(harness.history.query_recent("owner-a", 10).await.unwrap().len(), 2);
    assert!(harness.history.query_recent("owner-b", 10).await.unwrap().is_empty());
}
