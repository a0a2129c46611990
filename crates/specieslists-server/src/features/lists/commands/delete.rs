use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::features::FeatureState;
use crate::search::{can_administer, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteListCommand {
    pub list_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteListResponse {
    pub list_id: Uuid,
    pub deleted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteListError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not delete species list '{0}'")]
    Forbidden(Uuid),
    #[error(transparent)]
    Backend(#[from] AppError),
}

impl From<crate::db::DbError> for DeleteListError {
    fn from(e: crate::db::DbError) -> Self {
        Self::Backend(e.into())
    }
}

/// Delete a list with its records and documents. Releases are kept.
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: DeleteListCommand,
) -> Result<DeleteListResponse, DeleteListError> {
    let list = state
        .store
        .get_list(command.list_id)
        .await?
        .ok_or(DeleteListError::NotFound(command.list_id))?;
    if !can_administer(state.policy.as_ref(), caller, &list) {
        return Err(DeleteListError::Forbidden(list.id));
    }

    let deleted = state.sync.delete_list(list.id).await?;
    state.progress.remove(list.id).await;

    Ok(DeleteListResponse {
        list_id: list.id,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CanonicalStore;
    use crate::features::lists::commands::release;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::index::{SearchIndex, SearchRequest};
    use crate::models::{ListRecord, TaxonColumn, TaxonFields};
    use crate::search::Query;

    #[tokio::test]
    async fn test_delete_clears_store_and_index_but_keeps_releases() {
        let harness = TestHarness::new();
        harness.resolver.add_match("Pica pica", "urn:magpie");
        let list = harness.list("Birds", "owner").await;
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::ScientificName, "Pica pica");
        harness
            .store
            .insert_records(&[ListRecord::new(list.id, taxon, vec![])])
            .await
            .unwrap();
        harness.state.matcher.match_and_index(list.id, true).await.unwrap();
        let owner = CallerContext::user("owner");
        release::handle(
            &harness.state,
            &owner,
            release::ReleaseListCommand {
                list_id: list.id,
                force: false,
            },
        )
        .await
        .unwrap();

        let response = handle(&harness.state, &owner, DeleteListCommand { list_id: list.id })
            .await
            .unwrap();
        assert!(response.deleted);

        assert!(harness.store.get_list(list.id).await.unwrap().is_none());
        assert_eq!(harness.store.count_records(list.id).await.unwrap(), 0);
        let hits = harness
            .index
            .search(&SearchRequest::new(Query::term("speciesListID", list.id.to_string())))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);
        assert_eq!(harness.store.list_releases(list.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_editor_cannot_delete() {
        let harness = TestHarness::new();
        let mut list = harness.list("Birds", "owner").await;
        list.editors.push("editor".to_string());
        harness.store.update_list(&list).await.unwrap();

        let result = handle(
            &harness.state,
            &CallerContext::user("editor"),
            DeleteListCommand { list_id: list.id },
        )
        .await;
        assert!(matches!(result, Err(DeleteListError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_missing_list() {
        let harness = TestHarness::new();
        let result = handle(
            &harness.state,
            &CallerContext::user("owner"),
            DeleteListCommand { list_id: Uuid::new_v4() },
        )
        .await;
        assert!(matches!(result, Err(DeleteListError::NotFound(_))));
    }
}
