//! Configuration files driving a live scheduler

use super::test_utils::{Gate, Harness, HarnessOptions, StubEndpoint, StubMode};
use simmer::error::ConfigError;
use simmer::{ConfigLoader, JobParams, SchedulerError};
use tempfile::TempDir;

#[tokio::test]
async fn scheduler_limits_come_from_the_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("simmer.toml");
    std::fs::write(
        &path,
        "[scheduler]\nmax_concurrent = 1\nqueue_capacity = 0\n\n[resilience]\nmax_attempts = 1\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap().validated().unwrap();
    assert_eq!(config.resilience.max_attempts, 1);

    let gate = Gate::new();
    let harness = Harness::with_options(
        StubEndpoint::new(StubMode::WellFormed).gated(&gate),
        HarnessOptions {
            scheduler: config.scheduler.clone(),
            resilience: config.resilience.clone(),
            diversity: config.diversity.clone(),
            history_window: config.history.window,
            ..HarnessOptions::default()
        },
    );

    harness.scheduler.submit(JobParams::new("owner-c", 1)).unwrap();
    assert!(matches!(
        harness.scheduler.submit(JobParams::new("owner-c", 1)),
        Err(SchedulerError::CapacityExceeded { running: 1, queued: 0 })
    ));
    gate.open();
    harness.scheduler.shutdown().await;
}

#[test]
fn invalid_file_is_rejected_with_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(
        &path,
        "[provider]\nbase_url = \"ftp://example\"\n\n[scheduler]\nmax_concurrent = 0\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&path).unwrap().validated().unwrap_err();
    match err {
        ConfigError::Invalid(message) => {
            assert!(message.contains("provider"));
            assert!(message.contains("scheduler"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}
