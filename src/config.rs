//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file, the workspace
//! file, then `SIMMER__SECTION__KEY` environment variables. Tests included.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use config::Environment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimmerConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub diversity: DiversityConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Text generation endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Transport-level ceiling; the per-attempt timeout in `resilience` is the
    /// one that classifies failures.
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(),
            model: "qwen/qwen3-4b".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Request media for every item when a media endpoint is wired in.
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub max_attempts: usize,
    pub per_attempt_timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout_ms: 60_000,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            failure_threshold: 3,
            recovery_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub housekeeping_interval_ms: u64,
    /// How long a terminal job stays queryable before housekeeping drops it.
    pub job_retention_ms: u64,
    /// Reclaim map capacity after a sweep removes more than this many jobs.
    pub gc_hint_threshold: usize,
    /// Per-job wait during shutdown.
    pub shutdown_wait_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            queue_capacity: 10,
            housekeeping_interval_ms: 60_000,
            job_retention_ms: 300_000,
            gc_hint_threshold: 10,
            shutdown_wait_ms: 30_000,
        }
    }
}

/// What to do when an item collides with history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityPolicy {
    /// Keep the item and attach a warning.
    #[default]
    Advisory,
    /// Select new tags and generate once more; keep the second result.
    RegenerateOnce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub exclusion_window: usize,
    pub widen_when_batch_fits: bool,
    pub avoid_history: bool,
    pub similarity_policy: SimilarityPolicy,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            exclusion_window: 3,
            widen_when_batch_fits: true,
            avoid_history: true,
            similarity_policy: SimilarityPolicy::Advisory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Most-recent records kept per owner.
    pub window: usize,
    /// Sled database directory; in-memory history when unset.
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: 30,
            path: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(section: &'static str, message: impl Into<String>) -> Self {
        Self {
            section,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl SimmerConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.provider.model.trim().is_empty() {
            errors.push(ValidationError::new("provider", "Model cannot be empty"));
        }
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            errors.push(ValidationError::new(
                "provider",
                format!("Base URL must be http(s): {}", self.provider.base_url),
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            errors.push(ValidationError::new(
                "provider",
                "Temperature must be between 0.0 and 2.0",
            ));
        }

        if self.resilience.max_attempts == 0 {
            errors.push(ValidationError::new("resilience", "max_attempts must be at least 1"));
        }
        if self.resilience.failure_threshold == 0 {
            errors.push(ValidationError::new(
                "resilience",
                "failure_threshold must be at least 1",
            ));
        }
        if self.resilience.per_attempt_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "resilience",
                "per_attempt_timeout_ms must be positive",
            ));
        }

        if self.scheduler.max_concurrent == 0 {
            errors.push(ValidationError::new("scheduler", "max_concurrent must be at least 1"));
        }
        if self.scheduler.housekeeping_interval_ms == 0 {
            errors.push(ValidationError::new(
                "scheduler",
                "housekeeping_interval_ms must be positive",
            ));
        }

        if self.history.window == 0 {
            errors.push(ValidationError::new("history", "window must be at least 1"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all messages into one error.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigError::Invalid(messages.join("\n"))
        })?;
        Ok(self)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace, in precedence order (lowest first):
    /// defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<SimmerConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("SIMMER")
                .separator("__")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load one file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<SimmerConfig, ConfigError> {
        let config = merge::builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults only.
    pub fn defaults() -> Result<SimmerConfig, ConfigError> {
        Ok(merge::builder_with_defaults()?.build()?.try_deserialize()?)
    }
}
