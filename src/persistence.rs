//! Result persistence collaborator.
//!
//! Called exactly once per successfully completed job with the full item list.

use crate::error::PersistenceError;
use crate::recipe::Recipe;
use crate::shopping_list::ShoppingItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub job_id: String,
    pub requested: usize,
    pub fallback_count: usize,
    pub flagged_count: usize,
    pub shopping_list: Vec<ShoppingItem>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistenceCollaborator: Send + Sync {
    /// Store a finished batch and return its result reference.
    async fn create_result(
        &self,
        owner_id: &str,
        items: &[Recipe],
        metadata: &ResultMetadata,
    ) -> Result<String, PersistenceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub result_ref: String,
    pub owner_id: String,
    pub items: Vec<Recipe>,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<String, StoredResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, result_ref: &str) -> Option<StoredResult> {
        self.results.lock().get(result_ref).cloned()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceCollaborator for MemoryResultStore {
    async fn create_result(
        &self,
        owner_id: &str,
        items: &[Recipe],
        metadata: &ResultMetadata,
    ) -> Result<String, PersistenceError> {
        let result_ref = format!("result-{}", uuid::Uuid::new_v4());
        self.results.lock().insert(
            result_ref.clone(),
            StoredResult {
                result_ref: result_ref.clone(),
                owner_id: owner_id.to_string(),
                items: items.to_vec(),
                metadata: metadata.clone(),
            },
        );
        Ok(result_ref)
    }
}
