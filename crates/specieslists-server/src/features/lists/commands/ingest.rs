//! Ingest an upload into an existing list, or preview one

use serde::Serialize;
use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::ingest::{IngestError, IngestJob, IngestOptions, Upload};
use crate::jobs::JobHandle;
use crate::models::SpeciesList;
use crate::search::{can_edit, CallerContext};

#[derive(Debug, Clone)]
pub struct IngestCommand {
    /// Target list; may be `None` for a dry run
    pub list_id: Option<Uuid>,
    pub upload: Upload,
    pub options: IngestOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub job: IngestJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<SpeciesList>,
    #[serde(skip)]
    pub indexing: Option<JobHandle>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestCommandError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not edit species list '{0}'")]
    Forbidden(Uuid),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl IngestCommand {
    pub fn validate(&self) -> Result<(), IngestCommandError> {
        if self.list_id.is_none() && !self.options.dry_run {
            return Err(IngestError::ListIdRequired.into());
        }
        self.upload.format().map_err(IngestError::from)?;
        Ok(())
    }
}

#[tracing::instrument(skip(state, command), fields(list_id = ?command.list_id, dry_run = command.options.dry_run))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: IngestCommand,
) -> Result<IngestResponse, IngestCommandError> {
    command.validate()?;

    if let Some(list_id) = command.list_id {
        let list = state
            .store
            .get_list(list_id)
            .await?
            .ok_or(IngestCommandError::NotFound(list_id))?;
        if !can_edit(state.policy.as_ref(), caller, &list) {
            return Err(IngestCommandError::Forbidden(list_id));
        }
    }

    let outcome = state
        .loader
        .ingest(command.list_id, &command.upload, command.options)
        .await?;

    Ok(IngestResponse {
        job: outcome.job,
        list: outcome.list,
        indexing: outcome.indexing,
    })
}
