//! Versioned CSV releases
//!
//! A release is an immutable snapshot of a list at one version. Cutting a
//! release for a version that already has one returns the existing release
//! unless forced.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::{CanonicalStore, DbError};
use crate::models::{ListRecord, Release, SpeciesList, TaxonColumn};
use crate::storage::ArtifactStore;

pub const RELEASE_CONTENT_TYPE: &str = "text/csv";

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Species list {0} not found")]
    ListNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Could not write release file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Artifact storage failed: {0:#}")]
    Storage(anyhow::Error),
}

/// Storage key of a release artifact
pub fn artifact_key(list_id: Uuid, version: i64, release_id: Uuid) -> String {
    format!("releases/{list_id}/v{version}/{release_id}.csv")
}

/// Header row: record id, the taxonomic columns, then the list's fields
pub fn release_header(list: &SpeciesList) -> Vec<String> {
    std::iter::once("id".to_string())
        .chain(TaxonColumn::ALL.iter().map(|c| c.as_str().to_string()))
        .chain(list.field_list.iter().cloned())
        .collect()
}

fn release_row(list: &SpeciesList, record: &ListRecord) -> Vec<String> {
    std::iter::once(record.id.to_string())
        .chain(
            TaxonColumn::ALL
                .iter()
                .map(|c| record.taxon.get(*c).unwrap_or_default().to_string()),
        )
        .chain(
            list.field_list
                .iter()
                .map(|key| record.property(key).unwrap_or_default().to_string()),
        )
        .collect()
}

#[derive(Clone)]
pub struct ReleaseBuilder {
    store: Arc<dyn CanonicalStore>,
    artifacts: Arc<dyn ArtifactStore>,
    page_size: usize,
}

impl ReleaseBuilder {
    pub fn new(store: Arc<dyn CanonicalStore>, artifacts: Arc<dyn ArtifactStore>, page_size: usize) -> Self {
        Self {
            store,
            artifacts,
            page_size: page_size.max(1),
        }
    }

    /// Release the list's current version.
    ///
    /// The artifact is written before the release row, so a failed upload
    /// leaves the previous release authoritative.
    #[instrument(skip(self))]
    pub async fn release(&self, list_id: Uuid, force: bool) -> Result<Release, ReleaseError> {
        let list = self
            .store
            .get_list(list_id)
            .await?
            .ok_or(ReleaseError::ListNotFound(list_id))?;

        if !force {
            if let Some(latest) = self.store.latest_release(list_id).await? {
                if latest.released_version == list.version {
                    debug!(release_id = %latest.id, version = list.version, "List unchanged since last release");
                    return Ok(latest);
                }
            }
        }

        let (data, row_count) = self.render(&list).await?;

        let release_id = Uuid::new_v4();
        let key = artifact_key(list_id, list.version, release_id);
        let artifact = self
            .artifacts
            .put(&key, data, RELEASE_CONTENT_TYPE)
            .await
            .map_err(ReleaseError::Storage)?;

        let release = Release {
            id: release_id,
            list_id,
            released_version: list.version,
            location: artifact.location,
            metadata: list.metadata.clone(),
            row_count,
            checksum: artifact.checksum,
            size_bytes: artifact.size,
            created_at: Utc::now(),
        };
        self.store.insert_release(&release).await?;

        info!(
            release_id = %release.id,
            version = release.released_version,
            rows = row_count,
            location = %release.location,
            "Release written"
        );
        Ok(release)
    }

    async fn render(&self, list: &SpeciesList) -> Result<(Vec<u8>, i64), ReleaseError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(release_header(list))?;

        let mut rows = 0i64;
        let mut offset = 0;
        loop {
            let page = self.store.records_page(list.id, offset, self.page_size).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for record in &page {
                writer.write_record(release_row(list, record))?;
                rows += 1;
            }
            if page.len() < self.page_size {
                break;
            }
        }

        let data = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok((data, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{ListMetadata, ListType, Property, TaxonFields};
    use crate::storage::{LocalArtifactStore, StoredArtifact};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl ArtifactStore for FailingStore {
        async fn put(&self, _key: &str, _data: Vec<u8>, _content_type: &str) -> anyhow::Result<StoredArtifact> {
            Err(anyhow::anyhow!("bucket unavailable"))
        }

        async fn get(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
            Err(anyhow::anyhow!("bucket unavailable"))
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn seeded_store() -> (Arc<MemoryStore>, SpeciesList) {
        let store = Arc::new(MemoryStore::new());
        let mut list = SpeciesList::new(ListMetadata::new("Foxes", ListType::LocalList), "u1");
        list.field_list = vec!["note".to_string(), "status".to_string()];
        store.insert_list(&list).await.unwrap();

        let mut fox = TaxonFields::default();
        fox.set(TaxonColumn::ScientificName, "Vulpes vulpes");
        fox.set(TaxonColumn::Kingdom, "Animalia");
        let mut dingo = TaxonFields::default();
        dingo.set(TaxonColumn::ScientificName, "Canis lupus dingo");
        store
            .insert_records(&[
                ListRecord::new(list.id, fox, vec![Property::new("note", "x")]),
                ListRecord::new(list.id, dingo, vec![Property::new("status", "native")]),
            ])
            .await
            .unwrap();
        (store, list)
    }

    #[tokio::test]
    async fn test_release_writes_csv_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(LocalArtifactStore::new(dir.path()));
        let (store, list) = seeded_store().await;
        let builder = ReleaseBuilder::new(store.clone(), artifacts.clone(), 1);

        let first = builder.release(list.id, false).await.unwrap();
        assert_eq!(first.released_version, 1);
        assert_eq!(first.row_count, 2);
        assert_eq!(first.metadata.title, "Foxes");

        let key = artifact_key(list.id, 1, first.id);
        let csv = String::from_utf8(artifacts.get(&key).await.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "id,scientificName,vernacularName,taxonID,taxonConceptID,kingdom,phylum,class,order,family,genus,note,status"
        );
        assert!(lines[1].contains(",Vulpes vulpes,,,,Animalia,,,,,,x,"));
        assert!(lines[2].ends_with(",Canis lupus dingo,,,,,,,,,,,native"));

        let second = builder.release(list.id, false).await.unwrap();
        assert_eq!(second.id, first.id);

        let forced = builder.release(list.id, true).await.unwrap();
        assert_ne!(forced.id, first.id);
        assert_eq!(store.list_releases(list.id).await.unwrap()[0].id, forced.id);
    }

    #[tokio::test]
    async fn test_new_version_gets_new_release() {
        let dir = tempfile::tempdir().unwrap();
        let (store, list) = seeded_store().await;
        let builder = ReleaseBuilder::new(store.clone(), Arc::new(LocalArtifactStore::new(dir.path())), 100);

        let first = builder.release(list.id, false).await.unwrap();
        let updated = store.update_list(&list).await.unwrap();
        assert_eq!(updated.version, 2);

        let second = builder.release(list.id, false).await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.released_version, 2);
    }

    #[tokio::test]
    async fn test_upload_failure_writes_no_release() {
        let (store, list) = seeded_store().await;
        let builder = ReleaseBuilder::new(store.clone(), Arc::new(FailingStore), 100);

        let err = builder.release(list.id, false).await.unwrap_err();
        assert!(matches!(err, ReleaseError::Storage(_)));
        assert!(store.list_releases(list.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_list() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ReleaseBuilder::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LocalArtifactStore::new(dir.path())),
            100,
        );
        assert!(matches!(
            builder.release(Uuid::new_v4(), false).await,
            Err(ReleaseError::ListNotFound(_))
        ));
    }
}
