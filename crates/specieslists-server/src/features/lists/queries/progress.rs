//! Ingestion and migration progress

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::FeatureState;
use crate::jobs::{IngestProgress, MigrationProgressSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProgressQuery {
    pub list_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetProgressError {
    #[error("No progress recorded for species list '{0}'")]
    NotFound(Uuid),
}

/// Counters of the latest ingestion or matching run of a list
#[tracing::instrument(skip(state))]
pub async fn handle(state: &FeatureState, query: GetProgressQuery) -> Result<IngestProgress, GetProgressError> {
    state
        .progress
        .get(query.list_id)
        .await
        .ok_or(GetProgressError::NotFound(query.list_id))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GetMigrationProgressQuery;

/// Counters of the running or last bulk run
pub fn handle_migration(state: &FeatureState, _query: GetMigrationProgressQuery) -> MigrationProgressSnapshot {
    state.progress.migration()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::jobs::IngestStage;

    #[tokio::test]
    async fn test_progress_after_matching() {
        let harness = TestHarness::new();
        let list = harness.list("Birds", "owner").await;

        assert!(matches!(
            handle(&harness.state, GetProgressQuery { list_id: list.id }).await,
            Err(GetProgressError::NotFound(_))
        ));

        harness.state.matcher.match_and_index(list.id, true).await.unwrap();
        let progress = handle(&harness.state, GetProgressQuery { list_id: list.id }).await.unwrap();
        assert_eq!(progress.stage, IngestStage::Complete);
        assert_eq!(progress.total_rows, 0);
    }

    #[tokio::test]
    async fn test_migration_snapshot() {
        let harness = TestHarness::new();
        harness.list("Birds", "owner").await;
        harness.state.matcher.match_and_index_all(false).await.unwrap();

        let snapshot = handle_migration(&harness.state, GetMigrationProgressQuery);
        assert_eq!(snapshot.lists_total, 1);
        assert_eq!(snapshot.lists_processed, 1);
    }
}
