//! Rebuild documents from stored classifications

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobAccepted;
use crate::features::jobs::{check_run_permission, RunPermissionError};
use crate::features::FeatureState;
use crate::jobs::JobError;
use crate::search::CallerContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexCommand {
    /// Reindex one list, or every list when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    #[error(transparent)]
    Permission(#[from] RunPermissionError),
    #[error("Could not schedule reindex: {0}")]
    Job(#[from] JobError),
}

#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: ReindexCommand,
) -> Result<JobAccepted, ReindexError> {
    check_run_permission(state, caller, command.list_id).await?;

    let handle = match command.list_id {
        Some(list_id) => state.sync.reindex(list_id)?,
        None => state.sync.reindex_all()?,
    };
    tracing::info!(job_id = %handle.id, kind = %handle.kind, "Reindex queued");
    Ok(handle.into())
}
