//! Shared stubs and setup for integration tests
//!
//! The stub endpoint answers like a chat-completion server in one of several
//! modes and records how it was called, so scenarios can assert on both the
//! job outcome and the traffic behind it.

use async_trait::async_trait;
use parking_lot::Mutex;
use simmer::config::{DiversityConfig, ResilienceConfig, SchedulerConfig};
use simmer::error::CallError;
use simmer::history::{HistoryStore, InMemoryHistoryStore};
use simmer::orchestrator::GenerationOrchestrator;
use simmer::persistence::MemoryResultStore;
use simmer::progress::RecordingProgressSink;
use simmer::provider::{
    ChatMessage, CompletionOptions, MediaGenerationEndpoint, TextGenerationEndpoint,
};
use simmer::resilience::ResilientCaller;
use simmer::scheduler::{Collaborators, JobScheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    /// A valid JSON recipe, unique per call.
    WellFormed,
    /// Never answers; only the per-attempt timeout ends the call.
    Hang,
    ConnectionRefused,
    /// Prose with no recoverable fields.
    Gibberish,
}

pub struct StubEndpoint {
    mode: Mutex<StubMode>,
    delay: Duration,
    gate: Option<watch::Receiver<bool>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubEndpoint {
    pub fn new(mode: StubMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            delay: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls block until the gate is opened.
    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.tx.subscribe());
        self
    }

    pub fn set_mode(&self, mode: StubMode) {
        *self.mode.lock() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn well_formed(&self, call: usize, prompt: &str) -> String {
        let mut ingredients = vec![
            serde_json::json!({"item": format!("ingredient {} a", call), "quantity": "200", "unit": "g"}),
            serde_json::json!({"item": format!("ingredient {} b", call), "quantity": "1", "unit": "tbsp"}),
        ];
        if let Some(required) = required_ingredient(prompt) {
            ingredients.push(serde_json::json!({"item": required, "quantity": "150", "unit": "g"}));
        }
        serde_json::json!({
            "name": format!("Dish {}", call),
            "prep_time": "15 minutes",
            "cook_time": "30 minutes",
            "servings": 4,
            "difficulty": "Medium",
            "ingredients": ingredients,
            "instructions": ["Prepare", "Cook", "Serve"]
        })
        .to_string()
    }
}

fn required_ingredient(prompt: &str) -> Option<String> {
    prompt
        .lines()
        .find_map(|line| line.split("MUST include: ").nth(1))
        .map(|s| s.trim().to_string())
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerationEndpoint for StubEndpoint {
    fn endpoint_id(&self) -> &str {
        "text:stub"
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String, CallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().push(prompt.clone());

        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let _ = gate.wait_for(|open| *open).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mode = *self.mode.lock();
        match mode {
            StubMode::WellFormed => Ok(self.well_formed(call, &prompt)),
            StubMode::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(CallError::Connection("hung".to_string()))
            }
            StubMode::ConnectionRefused => Err(CallError::Connection("connection refused".to_string())),
            StubMode::Gibberish => Ok("I'm sorry, I can't help with that today.".to_string()),
        }
    }
}

/// Releases every gated stub call at once.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

/// Media stub: a reference per subject, or always failing.
pub struct StubMedia {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaGenerationEndpoint for StubMedia {
    fn endpoint_id(&self) -> &str {
        "media:stub"
    }

    async fn generate_media(&self, subject: &str) -> Result<Option<String>, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(CallError::RemoteRejected {
                status: 422,
                message: "content policy".to_string(),
            })
        } else {
            Ok(Some(format!("media://{}", subject.to_lowercase().replace(' ', "-"))))
        }
    }
}

pub struct HarnessOptions {
    pub scheduler: SchedulerConfig,
    pub resilience: ResilienceConfig,
    pub diversity: DiversityConfig,
    pub history: Option<Arc<dyn HistoryStore>>,
    pub history_window: usize,
    pub media: Option<Arc<dyn MediaGenerationEndpoint>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            resilience: ResilienceConfig::default(),
            diversity: DiversityConfig::default(),
            history: None,
            history_window: 30,
            media: None,
        }
    }
}

pub struct Harness {
    pub scheduler: JobScheduler,
    pub endpoint: Arc<StubEndpoint>,
    pub results: Arc<MemoryResultStore>,
    pub progress: Arc<RecordingProgressSink>,
    pub history: Arc<dyn HistoryStore>,
}

impl Harness {
    pub fn new(endpoint: StubEndpoint) -> Self {
        Self::with_options(endpoint, HarnessOptions::default())
    }

    /// Builds and starts a scheduler; call from within a runtime.
    pub fn with_options(endpoint: StubEndpoint, options: HarnessOptions) -> Self {
        let endpoint = Arc::new(endpoint);
        let history: Arc<dyn HistoryStore> = options
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new()));
        let orchestrator = GenerationOrchestrator::new(
            endpoint.clone(),
            ResilientCaller::new(&options.resilience),
            Arc::clone(&history),
            options.diversity,
            CompletionOptions::default(),
            options.history_window,
        );
        let results = Arc::new(MemoryResultStore::new());
        let progress = Arc::new(RecordingProgressSink::new());
        let scheduler = JobScheduler::new(
            options.scheduler,
            Collaborators {
                orchestrator: Arc::new(orchestrator),
                persistence: results.clone(),
                media: options.media,
                progress: progress.clone(),
            },
        );
        scheduler.start().expect("scheduler starts");
        Self {
            scheduler,
            endpoint,
            results,
            progress,
            history,
        }
    }
}

/// Fast retries for tests that exercise the wrapper in real time.
pub fn quick_resilience() -> ResilienceConfig {
    ResilienceConfig {
        max_attempts: 3,
        per_attempt_timeout_ms: 5_000,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        failure_threshold: 3,
        recovery_timeout_ms: 30_000,
    }
}

pub const WAIT: Duration = Duration::from_secs(30);
