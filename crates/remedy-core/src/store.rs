//! Cycle persistence
//!
//! Stores hold encoded [`CycleSnapshot`](remedy_phase::CycleSnapshot)s keyed by
//! pipeline name and cycle id, so an interrupted cycle can be resumed by a
//! fresh process.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use remedy_phase::CycleId;

/// One stored snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCycle {
    pub pipeline: String,
    pub cycle_id: CycleId,
    /// Encoded snapshot
    pub payload: String,
    pub stored_at: DateTime<Utc>,
}

/// Durable home for cycle snapshots
#[async_trait::async_trait]
pub trait CycleStore: Send + Sync {
    /// Insert or overwrite the snapshot for a cycle
    async fn save(&self, pipeline: &str, cycle_id: CycleId, payload: String) -> Result<(), StoreError>;

    async fn load(&self, pipeline: &str, cycle_id: CycleId) -> Result<Option<StoredCycle>, StoreError>;

    /// Ids stored for `pipeline`, oldest first
    async fn list(&self, pipeline: &str) -> Result<Vec<CycleId>, StoreError>;

    /// Returns whether anything was removed
    async fn remove(&self, pipeline: &str, cycle_id: CycleId) -> Result<bool, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryCycleStore {
    cycles: DashMap<(String, CycleId), StoredCycle>,
}

impl InMemoryCycleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

#[async_trait::async_trait]
impl CycleStore for InMemoryCycleStore {
    async fn save(&self, pipeline: &str, cycle_id: CycleId, payload: String) -> Result<(), StoreError> {
        self.cycles.insert(
            (pipeline.to_string(), cycle_id),
            StoredCycle {
                pipeline: pipeline.to_string(),
                cycle_id,
                payload,
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load(&self, pipeline: &str, cycle_id: CycleId) -> Result<Option<StoredCycle>, StoreError> {
        Ok(self
            .cycles
            .get(&(pipeline.to_string(), cycle_id))
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self, pipeline: &str) -> Result<Vec<CycleId>, StoreError> {
        // ULIDs sort by creation time
        let mut ids: Vec<CycleId> = self
            .cycles
            .iter()
            .filter(|entry| entry.key().0 == pipeline)
            .map(|entry| entry.key().1)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn remove(&self, pipeline: &str, cycle_id: CycleId) -> Result<bool, StoreError> {
        Ok(self.cycles.remove(&(pipeline.to_string(), cycle_id)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_overwrites_and_lists_by_pipeline() {
        let store = InMemoryCycleStore::new();
        let first: CycleId = "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        let second: CycleId = "01BX5ZZKBKACTAV9WEVGEMMVRZ".parse().unwrap();

        store.save("investigation", first, "a".into()).await.unwrap();
        store.save("investigation", first, "b".into()).await.unwrap();
        store.save("investigation", second, "c".into()).await.unwrap();
        store.save("regeneration", second, "d".into()).await.unwrap();

        assert_eq!(store.len(), 3);
        let loaded = store.load("investigation", first).await.unwrap().unwrap();
        assert_eq!(loaded.payload, "b");
        assert_eq!(store.list("investigation").await.unwrap(), vec![first, second]);

        assert!(store.remove("regeneration", second).await.unwrap());
        assert!(!store.remove("regeneration", second).await.unwrap());
        assert!(store.load("regeneration", second).await.unwrap().is_none());
    }
}
