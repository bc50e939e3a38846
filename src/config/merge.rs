//! Merge rules: built-in defaults under every other layer.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("provider.base_url", "http://localhost:1234")?
        .set_default("provider.model", "qwen/qwen3-4b")?
        .set_default("provider.temperature", 0.7)?
        .set_default("provider.max_tokens", 1000)?
        .set_default("provider.request_timeout_ms", 120_000)?
        .set_default("media.enabled", false)?
        .set_default("resilience.max_attempts", 3)?
        .set_default("resilience.per_attempt_timeout_ms", 60_000)?
        .set_default("resilience.initial_backoff_ms", 1_000)?
        .set_default("resilience.max_backoff_ms", 30_000)?
        .set_default("resilience.failure_threshold", 3)?
        .set_default("resilience.recovery_timeout_ms", 30_000)?
        .set_default("scheduler.max_concurrent", 3)?
        .set_default("scheduler.queue_capacity", 10)?
        .set_default("scheduler.housekeeping_interval_ms", 60_000)?
        .set_default("scheduler.job_retention_ms", 300_000)?
        .set_default("scheduler.gc_hint_threshold", 10)?
        .set_default("scheduler.shutdown_wait_ms", 30_000)?
        .set_default("diversity.exclusion_window", 3)?
        .set_default("diversity.widen_when_batch_fits", true)?
        .set_default("diversity.avoid_history", true)?
        .set_default("diversity.similarity_policy", "advisory")?
        .set_default("history.window", 30)
}
