use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::models::Release;
use crate::release::ReleaseError;
use crate::search::{can_edit, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseListCommand {
    pub list_id: Uuid,
    /// Write a new release even when the version is unchanged
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseListError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not release species list '{0}'")]
    Forbidden(Uuid),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: ReleaseListCommand,
) -> Result<Release, ReleaseListError> {
    let list = state
        .store
        .get_list(command.list_id)
        .await?
        .ok_or(ReleaseListError::NotFound(command.list_id))?;
    if !can_edit(state.policy.as_ref(), caller, &list) {
        return Err(ReleaseListError::Forbidden(list.id));
    }

    Ok(state.releases.release(list.id, command.force).await?)
}
