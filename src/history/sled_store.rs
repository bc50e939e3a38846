//! Durable history store over sled.
//!
//! Keys are `owner 0x00 timestamp_nanos(be) sequence(be)` so a prefix scan over
//! one owner yields records oldest first.

use super::{HistoryRecord, HistoryStore};
use crate::error::HistoryError;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

pub struct SledHistoryStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledHistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("history")?;
        Ok(Self { db, tree })
    }

    fn prefix(owner_id: &str) -> Vec<u8> {
        let mut prefix = owner_id.as_bytes().to_vec();
        prefix.push(0);
        prefix
    }

    fn key(&self, owner_id: &str, record: &HistoryRecord) -> Result<Vec<u8>, HistoryError> {
        let nanos = record
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0) as u64;
        let sequence = self.db.generate_id()?;
        let mut key = Self::prefix(owner_id);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());
        Ok(key)
    }
}

#[async_trait]
impl HistoryStore for SledHistoryStore {
    async fn append(&self, owner_id: &str, record: HistoryRecord) -> Result<(), HistoryError> {
        let key = self.key(owner_id, &record)?;
        let value = bincode::serialize(&record)?;
        self.tree.insert(key, value)?;
        Ok(())
    }

    async fn query_recent(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut records = Vec::with_capacity(limit.min(64));
        for entry in self.tree.scan_prefix(Self::prefix(owner_id)).rev().take(limit) {
            let (_, value) = entry?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    async fn prune(&self, owner_id: &str, keep: usize) -> Result<usize, HistoryError> {
        let keys = self
            .tree
            .scan_prefix(Self::prefix(owner_id))
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let excess = keys.len().saturating_sub(keep);
        for key in keys.into_iter().take(excess) {
            self.tree.remove(key)?;
        }
        if excess > 0 {
            debug!(owner_id, removed = excess, keep, "Pruned history");
        }
        Ok(excess)
    }
}
