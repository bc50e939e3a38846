//! Generation orchestrator: produces exactly one accepted item per call.
//!
//! Per item: select tags, compose the request, call the text endpoint through
//! the resilient wrapper, parse, synthesize a fallback when the call or the
//! parse fails, verify against history, then record the acceptance. There is
//! no item-level error; every call returns a [`Recipe`].

pub mod fallback;
pub mod prompt;

use crate::config::{DiversityConfig, SimilarityPolicy};
use crate::diversity::{DiversityEngine, DiversitySelection, DiversityState};
use crate::history::{HistoryRecord, HistoryStore};
use crate::parser::{parse_recipe, ParseContext, ParseOutcome};
use crate::progress::{ProgressPhase, ProgressReporter};
use crate::provider::{CompletionOptions, MediaGenerationEndpoint, TextGenerationEndpoint};
use crate::recipe::{Ingredient, Recipe};
use crate::resilience::ResilientCaller;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub liked_foods: Vec<String>,
    pub disliked_foods: Vec<String>,
    pub dietary_restrictions: Vec<String>,
}

/// One position of a batch.
#[derive(Debug, Clone, Copy)]
pub struct ItemRequest<'a> {
    pub owner_id: &'a str,
    /// 1-based.
    pub position: usize,
    pub total: usize,
    pub serving_size: u32,
    pub preferences: &'a Preferences,
    /// Set only on the batch position the must-include ingredient was assigned to.
    pub must_include: Option<&'a str>,
}

impl ItemRequest<'_> {
    fn parse_context(&self) -> ParseContext {
        ParseContext {
            item_number: self.position,
            serving_size: self.serving_size,
        }
    }
}

pub struct GenerationOrchestrator {
    text: Arc<dyn TextGenerationEndpoint>,
    caller: ResilientCaller,
    history: Arc<dyn HistoryStore>,
    diversity: DiversityEngine,
    options: CompletionOptions,
    history_window: usize,
}

impl GenerationOrchestrator {
    pub fn new(
        text: Arc<dyn TextGenerationEndpoint>,
        caller: ResilientCaller,
        history: Arc<dyn HistoryStore>,
        diversity: DiversityConfig,
        options: CompletionOptions,
        history_window: usize,
    ) -> Self {
        Self {
            text,
            caller,
            history,
            diversity: DiversityEngine::new(diversity),
            options,
            history_window: history_window.max(1),
        }
    }

    pub fn diversity_config(&self) -> &DiversityConfig {
        self.diversity.config()
    }

    pub fn caller(&self) -> &ResilientCaller {
        &self.caller
    }

    /// Produce, verify and record one item. Advances `state` on acceptance.
    pub async fn generate_item(
        &self,
        request: &ItemRequest<'_>,
        state: &mut DiversityState,
        reporter: &ProgressReporter,
    ) -> Recipe {
        let history = self.recent_history(request.owner_id).await;

        let mut tags = self.diversity.select(state, &history);
        let mut recipe = self.produce(request, state, &tags, reporter).await;

        if let Some(collision) = self.diversity.verify(&recipe, &tags, &history) {
            match self.diversity.config().similarity_policy {
                SimilarityPolicy::Advisory => {
                    warn!(
                        job_id = %reporter.job_id(),
                        item = request.position,
                        collision = %collision,
                        "Item resembles recent history"
                    );
                    recipe.similarity_warning = Some(collision.to_string());
                }
                SimilarityPolicy::RegenerateOnce => {
                    info!(
                        job_id = %reporter.job_id(),
                        item = request.position,
                        collision = %collision,
                        "Item resembles recent history, regenerating once"
                    );
                    let mut probe = state.clone();
                    probe.record(tags.clone(), &recipe);
                    tags = self.diversity.select(&probe, &history);
                    recipe = self.produce(request, state, &tags, reporter).await;
                    if let Some(again) = self.diversity.verify(&recipe, &tags, &history) {
                        warn!(
                            job_id = %reporter.job_id(),
                            item = request.position,
                            collision = %again,
                            "Regenerated item still resembles history"
                        );
                        recipe.similarity_warning = Some(again.to_string());
                    }
                }
            }
        }

        self.accept(request, state, &tags, &recipe).await;
        recipe
    }

    /// Ask the media endpoint for an item; any failure degrades to no media.
    pub async fn generate_media(
        &self,
        media: &dyn MediaGenerationEndpoint,
        recipe: &Recipe,
    ) -> Option<String> {
        let subject = recipe.name.as_str();
        match self
            .caller
            .call(media.endpoint_id(), || media.generate_media(subject))
            .await
        {
            Ok(reference) => reference,
            Err(err) => {
                warn!(endpoint = media.endpoint_id(), error = %err, "Media generation failed");
                None
            }
        }
    }

    async fn produce(
        &self,
        request: &ItemRequest<'_>,
        state: &DiversityState,
        tags: &DiversitySelection,
        reporter: &ProgressReporter,
    ) -> Recipe {
        let messages = prompt::build_messages(request, tags, state.used_carbs());
        let options = &self.options;
        let text = &self.text;

        reporter.note(
            ProgressPhase::Items,
            request.position,
            request.total,
            format!(
                "Requesting item {}/{} ({})",
                request.position, request.total, tags.origin
            ),
        );

        let reason = match self
            .caller
            .call(text.endpoint_id(), || text.generate(&messages, options))
            .await
        {
            Ok(raw) => match parse_recipe(&raw, request.parse_context()) {
                ParseOutcome::WellFormed(recipe) => return self.parsed(request, tags, recipe, reporter),
                ParseOutcome::Degraded { recipe, reason } => {
                    debug!(item = request.position, reason = %reason, "Degraded parse");
                    return self.parsed(request, tags, recipe, reporter);
                }
                ParseOutcome::Unparseable { raw } => {
                    warn!(
                        job_id = %reporter.job_id(),
                        item = request.position,
                        excerpt = %raw,
                        "Provider response unparseable"
                    );
                    "unparseable response".to_string()
                }
            },
            Err(err) => {
                warn!(
                    job_id = %reporter.job_id(),
                    item = request.position,
                    error = %err,
                    "Text generation failed"
                );
                err.to_string()
            }
        };

        reporter.note(
            ProgressPhase::Items,
            request.position,
            request.total,
            format!(
                "Using offline fallback for item {}/{}",
                request.position, request.total
            ),
        );
        let recipe = fallback::fallback_recipe(request, tags, reason);
        self.finish(request, tags, recipe, reporter)
    }

    fn finish(
        &self,
        request: &ItemRequest<'_>,
        tags: &DiversitySelection,
        mut recipe: Recipe,
        reporter: &ProgressReporter,
    ) -> Recipe {
        recipe.tags = Some(tags.clone());
        if let Some(ingredient) = request.must_include {
            if !recipe.mentions_ingredient(ingredient) {
                debug!(item = request.position, ingredient, "Adding missing must-include ingredient");
                recipe
                    .ingredients
                    .push(Ingredient::new(ingredient.trim(), "200", "g"));
            }
        }
        recipe
    }

    fn parsed(
        &self,
        request: &ItemRequest<'_>,
        tags: &DiversitySelection,
        recipe: Recipe,
        reporter: &ProgressReporter,
    ) -> Recipe {
        reporter.note(
            ProgressPhase::Items,
            request.position,
            request.total,
            format!("Parsed item {}/{}: {}", request.position, request.total, recipe.name),
        );
        self.finish(request, tags, recipe, reporter)
    }

    async fn recent_history(&self, owner_id: &str) -> Vec<HistoryRecord> {
        match self.history.query_recent(owner_id, self.history_window).await {
            Ok(records) => records,
            Err(err) => {
                warn!(owner_id, error = %err, "History unavailable, selecting without it");
                Vec::new()
            }
        }
    }

    async fn accept(
        &self,
        request: &ItemRequest<'_>,
        state: &mut DiversityState,
        tags: &DiversitySelection,
        recipe: &Recipe,
    ) {
        state.record(tags.clone(), recipe);

        let record = HistoryRecord::from_recipe(recipe, tags, Utc::now());
        if let Err(err) = self.history.append(request.owner_id, record).await {
            warn!(owner_id = request.owner_id, error = %err, "Failed to record history");
            return;
        }
        if let Err(err) = self
            .history
            .prune(request.owner_id, self.history_window)
            .await
        {
            warn!(owner_id = request.owner_id, error = %err, "Failed to prune history");
        }
    }
}
