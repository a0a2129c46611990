use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbError;
use crate::error::AppError;
use crate::features::lists::bump_list;
use crate::features::FeatureState;
use crate::search::{can_edit, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordCommand {
    pub record_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordResponse {
    pub record_id: Uuid,
    pub list_id: Uuid,
    /// List version after the deletion
    pub version: i64,
    pub row_count: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteRecordError {
    #[error("Record '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not edit species list '{0}'")]
    Forbidden(Uuid),
    #[error(transparent)]
    Backend(#[from] AppError),
}

impl From<DbError> for DeleteRecordError {
    fn from(e: DbError) -> Self {
        Self::Backend(e.into())
    }
}

/// Remove one record and its document, then bump the list version
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: DeleteRecordCommand,
) -> Result<DeleteRecordResponse, DeleteRecordError> {
    let record = state
        .store
        .get_record(command.record_id)
        .await?
        .ok_or(DeleteRecordError::NotFound(command.record_id))?;
    let list = state
        .store
        .get_list(record.list_id)
        .await?
        .ok_or(DeleteRecordError::NotFound(command.record_id))?;
    if !can_edit(state.policy.as_ref(), caller, &list) {
        return Err(DeleteRecordError::Forbidden(list.id));
    }

    if !state.sync.delete_record(record.id).await? {
        return Err(DeleteRecordError::NotFound(record.id));
    }

    let list = bump_list(state.store.as_ref(), list.id, |l| l.row_count = (l.row_count - 1).max(0)).await?;

    Ok(DeleteRecordResponse {
        record_id: record.id,
        list_id: list.id,
        version: list.version,
        row_count: list.row_count,
    })
}
