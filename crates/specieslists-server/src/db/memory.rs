//! In-memory canonical store
//!
//! Used by tests and by the CLI's `--in-memory` mode. Lists and records keep
//! insertion order so paging behaves like the Postgres store.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CanonicalStore, DbError, DbResult};
use crate::models::{Classification, ListRecord, Release, SpeciesList};

#[derive(Default)]
struct Inner {
    lists: Vec<SpeciesList>,
    records: Vec<ListRecord>,
    releases: Vec<Release>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CanonicalStore for MemoryStore {
    async fn insert_list(&self, list: &SpeciesList) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        if inner.lists.iter().any(|l| l.id == list.id) {
            return Err(DbError::duplicate("List", &list.id.to_string()));
        }
        inner.lists.push(list.clone());
        Ok(())
    }

    async fn get_list(&self, id: Uuid) -> DbResult<Option<SpeciesList>> {
        let inner = self.inner.read().await;
        Ok(inner.lists.iter().find(|l| l.id == id).cloned())
    }

    async fn update_list(&self, list: &SpeciesList) -> DbResult<SpeciesList> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .lists
            .iter_mut()
            .find(|l| l.id == list.id)
            .ok_or_else(|| DbError::not_found("List", &list.id.to_string()))?;

        if stored.version != list.version {
            return Err(DbError::VersionConflict {
                expected: list.version,
                actual: stored.version,
            });
        }

        let mut updated = list.clone();
        updated.version = list.version + 1;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn set_list_counts(&self, id: Uuid, row_count: i64, distinct_match_count: i64) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .lists
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| DbError::not_found("List", &id.to_string()))?;
        stored.row_count = row_count;
        stored.distinct_match_count = distinct_match_count;
        Ok(())
    }

    async fn delete_list(&self, id: Uuid) -> DbResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.lists.len();
        inner.lists.retain(|l| l.id != id);
        inner.records.retain(|r| r.list_id != id);
        Ok(inner.lists.len() != before)
    }

    async fn lists_page(&self, offset: usize, limit: usize) -> DbResult<Vec<SpeciesList>> {
        let inner = self.inner.read().await;
        Ok(inner.lists.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count_lists(&self) -> DbResult<i64> {
        Ok(self.inner.read().await.lists.len() as i64)
    }

    async fn insert_records(&self, records: &[ListRecord]) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        for record in records {
            if !inner.lists.iter().any(|l| l.id == record.list_id) {
                return Err(DbError::not_found("List", &record.list_id.to_string()));
            }
        }
        inner.records.extend_from_slice(records);
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> DbResult<Option<ListRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn update_record(&self, record: &ListRecord) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| DbError::not_found("Record", &record.id.to_string()))?;
        *stored = record.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn set_classification(&self, record_id: Uuid, classification: &Classification) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| DbError::not_found("Record", &record_id.to_string()))?;
        stored.classification = Some(classification.clone());
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_record(&self, id: Uuid) -> DbResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() != before)
    }

    async fn delete_records_for_list(&self, list_id: Uuid) -> DbResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.list_id != list_id);
        Ok((before - inner.records.len()) as u64)
    }

    async fn records_page(&self, list_id: Uuid, offset: usize, limit: usize) -> DbResult<Vec<ListRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.list_id == list_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_records(&self, list_id: Uuid) -> DbResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().filter(|r| r.list_id == list_id).count() as i64)
    }

    async fn insert_release(&self, release: &Release) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .releases
            .iter()
            .any(|r| r.id == release.id)
        {
            return Err(DbError::duplicate("Release", &release.id.to_string()));
        }
        inner.releases.push(release.clone());
        Ok(())
    }

    async fn latest_release(&self, list_id: Uuid) -> DbResult<Option<Release>> {
        Ok(self.list_releases(list_id).await?.into_iter().next())
    }

    async fn list_releases(&self, list_id: Uuid) -> DbResult<Vec<Release>> {
        let inner = self.inner.read().await;
        let mut releases: Vec<Release> = inner
            .releases
            .iter()
            .rev()
            .filter(|r| r.list_id == list_id)
            .cloned()
            .collect();
        // stable sort keeps later inserts first among equal versions
        releases.sort_by(|a, b| {
            b.released_version
                .cmp(&a.released_version)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(releases)
    }
}
