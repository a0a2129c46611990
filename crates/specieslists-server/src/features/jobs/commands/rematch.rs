//! Re-resolve names and rebuild documents

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobAccepted;
use crate::features::jobs::{check_run_permission, RunPermissionError};
use crate::features::FeatureState;
use crate::jobs::JobError;
use crate::search::CallerContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RematchCommand {
    /// Rematch one list, or every list when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum RematchError {
    #[error(transparent)]
    Permission(#[from] RunPermissionError),
    #[error("Could not schedule rematch: {0}")]
    Job(#[from] JobError),
}

/// Queue a rematch. Rejected, not queued, when the pool is saturated.
#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: RematchCommand,
) -> Result<JobAccepted, RematchError> {
    check_run_permission(state, caller, command.list_id).await?;

    let handle = match command.list_id {
        Some(list_id) => state.dispatcher.match_and_index(list_id, true)?,
        None => state.dispatcher.match_and_index_all(true)?,
    };
    tracing::info!(job_id = %handle.id, kind = %handle.kind, "Rematch queued");
    Ok(handle.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CanonicalStore;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::models::{ListRecord, TaxonColumn, TaxonFields};
    use crate::search::visibility::ADMIN_ROLE;

    #[tokio::test]
    async fn test_owner_rematches_own_list() {
        let harness = TestHarness::new();
        let list = harness.list("Birds", "owner").await;
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::ScientificName, "Pica pica");
        harness
            .store
            .insert_records(&[ListRecord::new(list.id, taxon, vec![])])
            .await
            .unwrap();
        harness.resolver.add_match("Pica pica", "urn:magpie");

        let accepted = handle(
            &harness.state,
            &CallerContext::user("owner"),
            RematchCommand { list_id: Some(list.id) },
        )
        .await
        .unwrap();
        let summary = accepted.handle.wait().await.unwrap();
        assert_eq!(summary.distinct_matches, 1);

        let stored = harness.store.get_list(list.id).await.unwrap().unwrap();
        assert_eq!(stored.distinct_match_count, 1);
    }

    #[tokio::test]
    async fn test_rematch_all_requires_admin() {
        let harness = TestHarness::new();
        harness.list("Birds", "owner").await;

        let result = handle(&harness.state, &CallerContext::user("owner"), RematchCommand::default()).await;
        assert!(matches!(
            result,
            Err(RematchError::Permission(RunPermissionError::Forbidden))
        ));

        let admin = CallerContext::user("admin").with_role(ADMIN_ROLE);
        let accepted = handle(&harness.state, &admin, RematchCommand::default()).await.unwrap();
        assert_eq!(accepted.handle.wait().await.unwrap().lists_processed, 1);
    }

    #[tokio::test]
    async fn test_unknown_list() {
        let harness = TestHarness::new();
        let admin = CallerContext::user("admin").with_role(ADMIN_ROLE);
        let result = handle(
            &harness.state,
            &admin,
            RematchCommand {
                list_id: Some(Uuid::new_v4()),
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(RematchError::Permission(RunPermissionError::NotFound(_)))
        ));
    }
}
