//! Ingestion and migration progress
//!
//! Counters are atomics so the loader and the matcher can bump them from
//! worker tasks while queries read consistent-enough snapshots. A
//! [`ProgressStore`] is created once per application and shared by clone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Ingesting,
    Matching,
    Complete,
    Failed,
}

impl IngestStage {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => IngestStage::Ingesting,
            1 => IngestStage::Matching,
            2 => IngestStage::Complete,
            _ => IngestStage::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            IngestStage::Ingesting => 0,
            IngestStage::Matching => 1,
            IngestStage::Complete => 2,
            IngestStage::Failed => 3,
        }
    }
}

/// Live counters for one list
#[derive(Debug)]
pub struct ListProgress {
    list_id: Uuid,
    stage: AtomicU8,
    total_rows: AtomicU64,
    rows_ingested: AtomicU64,
    rows_matched: AtomicU64,
    rows_indexed: AtomicU64,
    rows_failed: AtomicU64,
    started_at: DateTime<Utc>,
}

impl ListProgress {
    fn new(list_id: Uuid) -> Self {
        Self {
            list_id,
            stage: AtomicU8::new(IngestStage::Ingesting.as_u8()),
            total_rows: AtomicU64::new(0),
            rows_ingested: AtomicU64::new(0),
            rows_matched: AtomicU64::new(0),
            rows_indexed: AtomicU64::new(0),
            rows_failed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn set_stage(&self, stage: IngestStage) {
        self.stage.store(stage.as_u8(), Ordering::SeqCst);
    }

    pub fn set_total(&self, total: u64) {
        self.total_rows.store(total, Ordering::SeqCst);
    }

    pub fn add_ingested(&self, rows: u64) {
        self.rows_ingested.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn add_matched(&self, rows: u64) {
        self.rows_matched.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn add_indexed(&self, rows: u64) {
        self.rows_indexed.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn add_failed(&self, rows: u64) {
        self.rows_failed.fetch_add(rows, Ordering::SeqCst);
    }

    /// Clear the matching counters before a new matching run
    pub fn restart_matching(&self, total: u64) {
        self.total_rows.store(total, Ordering::SeqCst);
        self.rows_matched.store(0, Ordering::SeqCst);
        self.rows_indexed.store(0, Ordering::SeqCst);
        self.rows_failed.store(0, Ordering::SeqCst);
        self.set_stage(IngestStage::Matching);
    }

    pub fn snapshot(&self) -> IngestProgress {
        IngestProgress {
            list_id: self.list_id,
            stage: IngestStage::from_u8(self.stage.load(Ordering::SeqCst)),
            total_rows: self.total_rows.load(Ordering::SeqCst),
            rows_ingested: self.rows_ingested.load(Ordering::SeqCst),
            rows_matched: self.rows_matched.load(Ordering::SeqCst),
            rows_indexed: self.rows_indexed.load(Ordering::SeqCst),
            rows_failed: self.rows_failed.load(Ordering::SeqCst),
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a list's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestProgress {
    #[serde(rename = "speciesListID")]
    pub list_id: Uuid,
    pub stage: IngestStage,
    pub total_rows: u64,
    pub rows_ingested: u64,
    pub rows_matched: u64,
    pub rows_indexed: u64,
    pub rows_failed: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MigrationProgress {
    lists_total: AtomicU64,
    lists_processed: AtomicU64,
    rows_processed: AtomicU64,
}

/// Point-in-time view of a bulk migration or rematch-all run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgressSnapshot {
    pub lists_total: u64,
    pub lists_processed: u64,
    pub rows_processed: u64,
}

#[derive(Clone, Default)]
pub struct ProgressStore {
    lists: Arc<RwLock<HashMap<Uuid, Arc<ListProgress>>>>,
    migration: Arc<MigrationProgress>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a list, created on first use
    pub async fn list(&self, list_id: Uuid) -> Arc<ListProgress> {
        if let Some(progress) = self.lists.read().await.get(&list_id) {
            return Arc::clone(progress);
        }
        let mut lists = self.lists.write().await;
        Arc::clone(
            lists
                .entry(list_id)
                .or_insert_with(|| Arc::new(ListProgress::new(list_id))),
        )
    }

    /// Replace a list's counters with fresh ones
    pub async fn start(&self, list_id: Uuid) -> Arc<ListProgress> {
        let progress = Arc::new(ListProgress::new(list_id));
        self.lists.write().await.insert(list_id, Arc::clone(&progress));
        progress
    }

    pub async fn get(&self, list_id: Uuid) -> Option<IngestProgress> {
        self.lists.read().await.get(&list_id).map(|p| p.snapshot())
    }

    pub async fn remove(&self, list_id: Uuid) {
        self.lists.write().await.remove(&list_id);
    }

    pub fn start_migration(&self, lists_total: u64) {
        self.migration.lists_total.store(lists_total, Ordering::SeqCst);
        self.migration.lists_processed.store(0, Ordering::SeqCst);
        self.migration.rows_processed.store(0, Ordering::SeqCst);
    }

    pub fn migration_list_done(&self) {
        self.migration.lists_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn migration_rows(&self, rows: u64) {
        self.migration.rows_processed.fetch_add(rows, Ordering::SeqCst);
    }

    pub fn migration(&self) -> MigrationProgressSnapshot {
        MigrationProgressSnapshot {
            lists_total: self.migration.lists_total.load(Ordering::SeqCst),
            lists_processed: self.migration.lists_processed.load(Ordering::SeqCst),
            rows_processed: self.migration.rows_processed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_progress_shared_between_clones() {
        let store = ProgressStore::new();
        let id = Uuid::new_v4();
        assert!(store.get(id).await.is_none());

        let progress = store.start(id).await;
        progress.set_total(10);
        progress.add_ingested(4);

        let other = store.clone();
        other.list(id).await.add_ingested(6);

        let snapshot = store.get(id).await.unwrap();
        assert_eq!(snapshot.rows_ingested, 10);
        assert_eq!(snapshot.stage, IngestStage::Ingesting);
    }

    #[tokio::test]
    async fn test_restart_matching_resets_match_counters() {
        let store = ProgressStore::new();
        let progress = store.start(Uuid::new_v4()).await;
        progress.add_ingested(5);
        progress.add_matched(5);
        progress.add_failed(1);

        progress.restart_matching(5);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.stage, IngestStage::Matching);
        assert_eq!(snapshot.rows_matched, 0);
        assert_eq!(snapshot.rows_failed, 0);
        assert_eq!(snapshot.rows_ingested, 5);
    }

    #[test]
    fn test_migration_counters() {
        let store = ProgressStore::new();
        store.start_migration(3);
        store.migration_rows(100);
        store.migration_list_done();
        assert_eq!(
            store.migration(),
            MigrationProgressSnapshot {
                lists_total: 3,
                lists_processed: 1,
                rows_processed: 100,
            }
        );
    }
}
