use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::models::SpeciesList;
use crate::search::{can_view, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetListQuery {
    pub list_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetListError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Fetch a list. Private lists the caller may not see are reported as
/// missing.
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    query: GetListQuery,
) -> Result<SpeciesList, GetListError> {
    state
        .store
        .get_list(query.list_id)
        .await?
        .filter(|list| can_view(state.policy.as_ref(), caller, list))
        .ok_or(GetListError::NotFound(query.list_id))
}
