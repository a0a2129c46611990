use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::models::Release;
use crate::search::{can_view, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReleasesQuery {
    pub list_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum ListReleasesError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Releases of a list, newest first.
///
/// Releases outlive their list; once the list is deleted only callers who see
/// everything can read them.
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    query: ListReleasesQuery,
) -> Result<Vec<Release>, ListReleasesError> {
    let policy = state.policy.as_ref();
    let visible = match state.store.get_list(query.list_id).await? {
        Some(list) => can_view(policy, caller, &list),
        None => policy.sees_everything(caller),
    };
    if !visible {
        return Err(ListReleasesError::NotFound(query.list_id));
    }

    Ok(state.store.list_releases(query.list_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::search::visibility::ADMIN_ROLE;

    #[tokio::test]
    async fn test_releases_newest_first() {
        let harness = TestHarness::new();
        let list = harness.list("Birds", "owner").await;

        let first = harness.state.releases.release(list.id, false).await.unwrap();
        let second = harness.state.releases.release(list.id, true).await.unwrap();

        let releases = handle(
            &harness.state,
            &CallerContext::anonymous(),
            ListReleasesQuery { list_id: list.id },
        )
        .await
        .unwrap();
        let ids: Vec<Uuid> = releases.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_releases_of_deleted_list_need_admin() {
        let harness = TestHarness::new();
        let list = harness.list("Birds", "owner").await;
        harness.state.releases.release(list.id, false).await.unwrap();
        harness.state.sync.delete_list(list.id).await.unwrap();

        let query = || ListReleasesQuery { list_id: list.id };
        assert!(matches!(
            handle(&harness.state, &CallerContext::user("owner"), query()).await,
            Err(ListReleasesError::NotFound(_))
        ));

        let admin = CallerContext::user("admin").with_role(ADMIN_ROLE);
        assert_eq!(handle(&harness.state, &admin, query()).await.unwrap().len(), 1);
    }
}
