//! Schedules matching work on the job pool

use futures::FutureExt;
use uuid::Uuid;

use super::{JobError, JobHandle, JobKind, JobPool};
use crate::matching::TaxonMatcher;

/// Submits [`TaxonMatcher`] runs to a [`JobPool`]
#[derive(Clone)]
pub struct JobDispatcher {
    pool: JobPool,
    matcher: TaxonMatcher,
}

impl JobDispatcher {
    pub fn new(pool: JobPool, matcher: TaxonMatcher) -> Self {
        Self { pool, matcher }
    }

    pub fn pool(&self) -> &JobPool {
        &self.pool
    }

    pub fn match_and_index(&self, list_id: Uuid, rematch: bool) -> Result<JobHandle, JobError> {
        let matcher = self.matcher.clone();
        self.pool.submit(
            JobKind::MatchAndIndex { list_id, rematch },
            async move { matcher.match_and_index(list_id, rematch).await }.boxed(),
        )
    }

    pub fn match_and_index_all(&self, rematch: bool) -> Result<JobHandle, JobError> {
        let matcher = self.matcher.clone();
        self.pool.submit(
            JobKind::MatchAndIndexAll { rematch },
            async move { matcher.match_and_index_all(rematch).await }.boxed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::models::{ListMetadata, ListRecord, ListType, SpeciesList, TaxonColumn, TaxonFields};

    #[tokio::test]
    async fn test_dispatched_job_indexes_list() {
        let harness = TestHarness::new();
        harness.resolver.add_match("Vulpes vulpes", "urn:fox");
        let list = SpeciesList::new(ListMetadata::new("Foxes", ListType::LocalList), "user-1");
        harness.state.store.insert_list(&list).await.unwrap();
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::ScientificName, "Vulpes vulpes");
        harness
            .state
            .store
            .insert_records(&[ListRecord::new(list.id, taxon, vec![])])
            .await
            .unwrap();

        let handle = harness.state.dispatcher.match_and_index(list.id, true).unwrap();
        assert_eq!(handle.kind, JobKind::MatchAndIndex { list_id: list.id, rematch: true });

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.records_indexed, 1);
        assert_eq!(harness.index.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let harness = TestHarness::new();
        let handle = harness.state.dispatcher.match_and_index(Uuid::new_v4(), false).unwrap();
        assert!(matches!(handle.wait().await, Err(JobError::Failed(_))));
    }
}
