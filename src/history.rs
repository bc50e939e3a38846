//! Per-owner generation history and the fingerprint glue that feeds it.
//!
//! The history collaborator is append-only with a bounded window of the most
//! recent records per owner. Pruning is eventually consistent: a reader may
//! briefly observe more than `keep` records.

pub mod fingerprint;
pub mod sled_store;

pub use fingerprint::{fingerprint, signature};
pub use sled_store::SledHistoryStore;

use crate::diversity::DiversitySelection;
use crate::error::HistoryError;
use crate::recipe::Recipe;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Number of leading components that make up a record's main ingredients.
pub const MAIN_INGREDIENT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub fingerprint: String,
    pub name: String,
    pub tags: DiversitySelection,
    pub main_ingredients: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn from_recipe(recipe: &Recipe, tags: &DiversitySelection, timestamp: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint(recipe, tags),
            name: recipe.name.clone(),
            tags: tags.clone(),
            main_ingredients: recipe
                .ingredients
                .iter()
                .take(MAIN_INGREDIENT_COUNT)
                .map(|i| i.item.to_lowercase())
                .collect(),
            timestamp,
        }
    }
}

/// Storage for accepted-item history, keyed by owner.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, owner_id: &str, record: HistoryRecord) -> Result<(), HistoryError>;

    /// Most recent first, at most `limit` records.
    async fn query_recent(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Drop all but the newest `keep` records; returns how many were removed.
    async fn prune(&self, owner_id: &str, keep: usize) -> Result<usize, HistoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<HashMap<String, VecDeque<HistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, owner_id: &str) -> usize {
        self.records.lock().get(owner_id).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, owner_id: &str, record: HistoryRecord) -> Result<(), HistoryError> {
        self.records
            .lock()
            .entry(owner_id.to_string())
            .or_default()
            .push_back(record);
        Ok(())
    }

    async fn query_recent(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(self
            .records
            .lock()
            .get(owner_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn prune(&self, owner_id: &str, keep: usize) -> Result<usize, HistoryError> {
        let mut records = self.records.lock();
        let Some(owned) = records.get_mut(owner_id) else {
            return Ok(0);
        };
        let excess = owned.len().saturating_sub(keep);
        owned.drain(..excess);
        Ok(excess)
    }
}
