//! Replace a list's records with a new upload

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::index::IndexError;
use crate::ingest::{IngestError, IngestJob, IngestOptions, Upload};
use crate::jobs::JobHandle;
use crate::models::SpeciesList;
use crate::search::{can_edit, CallerContext};

#[derive(Debug, Clone)]
pub struct ReingestCommand {
    pub list_id: Uuid,
    pub upload: Upload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReingestResponse {
    pub list: SpeciesList,
    pub job: IngestJob,
    pub records_removed: u64,
    #[serde(skip)]
    pub indexing: Option<JobHandle>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReingestError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not edit species list '{0}'")]
    Forbidden(Uuid),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
}

impl ReingestCommand {
    pub fn validate(&self) -> Result<(), ReingestError> {
        self.upload.format().map_err(IngestError::from)?;
        Ok(())
    }
}

/// Swap a list's content for a new upload.
///
/// The upload is parsed in full before anything is deleted, so a malformed
/// file leaves the existing records in place.
#[tracing::instrument(skip(state, command), fields(list_id = %command.list_id))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: ReingestCommand,
) -> Result<ReingestResponse, ReingestError> {
    command.validate()?;

    let list = state
        .store
        .get_list(command.list_id)
        .await?
        .ok_or(ReingestError::NotFound(command.list_id))?;
    if !can_edit(state.policy.as_ref(), caller, &list) {
        return Err(ReingestError::Forbidden(list.id));
    }

    state
        .loader
        .ingest(Some(list.id), &command.upload, IngestOptions::dry_run())
        .await?;

    let records_removed = state.store.delete_records_for_list(list.id).await?;
    let documents_removed = state.index.delete_by_list(list.id).await?;
    info!(records_removed, documents_removed, "Cleared list before reingest");

    let outcome = state
        .loader
        .ingest(Some(list.id), &command.upload, IngestOptions::default())
        .await?;
    let list = match outcome.list {
        Some(list) => list,
        None => state
            .store
            .get_list(command.list_id)
            .await?
            .ok_or(ReingestError::NotFound(command.list_id))?,
    };

    Ok(ReingestResponse {
        list,
        job: outcome.job,
        records_removed,
        indexing: outcome.indexing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CanonicalStore;
    use crate::features::lists::commands::create;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::models::{ListMetadata, ListType};

    async fn created(harness: &TestHarness) -> SpeciesList {
        let response = create::handle(
            &harness.state,
            &CallerContext::user("owner"),
            create::CreateListCommand {
                metadata: ListMetadata::new("Weeds", ListType::LocalList),
                upload: Upload::new("weeds.csv", "scientificName,note\nLantana camara,a\nRubus fruticosus,b\n"),
            },
        )
        .await
        .unwrap();
        response.indexing.unwrap().wait().await.unwrap();
        response.list
    }

    #[tokio::test]
    async fn test_reingest_replaces_records_and_documents() {
        let harness = TestHarness::new();
        let list = created(&harness).await;
        assert_eq!(harness.index.len().await, 2);

        let response = handle(
            &harness.state,
            &CallerContext::user("owner"),
            ReingestCommand {
                list_id: list.id,
                upload: Upload::new("weeds.csv", "scientificName,status\nUlex europaeus,declared\n"),
            },
        )
        .await
        .unwrap();

        assert_eq!(response.records_removed, 2);
        assert_eq!(response.list.row_count, 1);
        assert_eq!(response.list.field_list, vec!["status".to_string()]);
        response.indexing.unwrap().wait().await.unwrap();
        assert_eq!(harness.index.len().await, 1);
    }

    #[tokio::test]
    async fn test_bad_upload_keeps_existing_records() {
        let harness = TestHarness::new();
        let list = created(&harness).await;

        let result = handle(
            &harness.state,
            &CallerContext::user("owner"),
            ReingestCommand {
                list_id: list.id,
                upload: Upload::new("weeds.csv", ""),
            },
        )
        .await;
        assert!(matches!(result, Err(ReingestError::Ingest(IngestError::MissingHeader))));
        assert_eq!(harness.store.count_records(list.id).await.unwrap(), 2);

        let wrong_format = handle(
            &harness.state,
            &CallerContext::user("owner"),
            ReingestCommand {
                list_id: list.id,
                upload: Upload::new("weeds.pdf", "%PDF"),
            },
        )
        .await;
        assert!(matches!(wrong_format, Err(ReingestError::Ingest(IngestError::Format(_)))));
        assert_eq!(harness.index.len().await, 2);
    }
}
