//! Create a list from an uploaded checklist

use serde::Serialize;
use tracing::{info, warn};

use crate::db::DbError;
use crate::features::shared::validation::{validate_metadata, MetadataValidationError};
use crate::features::FeatureState;
use crate::ingest::{IngestError, IngestJob, IngestOptions, Upload};
use crate::jobs::JobHandle;
use crate::models::{ListMetadata, SpeciesList};
use crate::search::CallerContext;

#[derive(Debug, Clone)]
pub struct CreateListCommand {
    pub metadata: ListMetadata,
    pub upload: Upload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListResponse {
    pub list: SpeciesList,
    pub job: IngestJob,
    /// Matching and indexing run scheduled for the new records
    #[serde(skip)]
    pub indexing: Option<JobHandle>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateListError {
    #[error("Invalid list metadata: {0}")]
    Validation(#[from] MetadataValidationError),
    #[error("Creating a list requires an authenticated caller")]
    Unauthenticated,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl CreateListCommand {
    pub fn validate(&self) -> Result<(), CreateListError> {
        validate_metadata(&self.metadata)?;
        self.upload.format().map_err(IngestError::from)?;
        Ok(())
    }
}

/// Create a list owned by the caller and ingest the upload into it.
///
/// The list is removed again when ingestion fails, so a rejected upload
/// leaves nothing behind.
#[tracing::instrument(skip(state, command), fields(title = %command.metadata.title))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: CreateListCommand,
) -> Result<CreateListResponse, CreateListError> {
    command.validate()?;
    let owner = caller.user_id.clone().ok_or(CreateListError::Unauthenticated)?;

    let list = SpeciesList::new(command.metadata, owner);
    state.store.insert_list(&list).await?;

    let outcome = match state
        .loader
        .ingest(Some(list.id), &command.upload, IngestOptions::default())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(list_id = %list.id, error = %e, "Ingestion failed, removing new list");
            state.store.delete_records_for_list(list.id).await?;
            state.store.delete_list(list.id).await?;
            state.progress.remove(list.id).await;
            return Err(e.into());
        },
    };

    let list = outcome.list.unwrap_or(list);
    info!(list_id = %list.id, rows = outcome.job.row_count, "List created");

    Ok(CreateListResponse {
        list,
        job: outcome.job,
        indexing: outcome.indexing,
    })
}
