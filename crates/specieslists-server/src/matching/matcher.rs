//! Match records to taxa and write their search documents

use anyhow::{anyhow, Context};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{NameQuery, NameResolver};
use crate::config::PipelineSettings;
use crate::db::CanonicalStore;
use crate::index::{BulkWriter, IndexDocument, SearchIndex};
use crate::jobs::{IngestStage, JobSummary, ListProgress, ProgressStore};
use crate::models::{Classification, ListRecord, SpeciesList};

#[derive(Clone)]
pub struct TaxonMatcher {
    store: Arc<dyn CanonicalStore>,
    resolver: Arc<dyn NameResolver>,
    index: Arc<dyn SearchIndex>,
    progress: ProgressStore,
    settings: PipelineSettings,
}

/// Per-run state shared by the records of one list
struct ListRun<'a> {
    list: &'a SpeciesList,
    rematch: bool,
    progress: &'a ListProgress,
    writer: BulkWriter,
    concepts: HashSet<String>,
    summary: JobSummary,
}

impl TaxonMatcher {
    pub fn new(
        store: Arc<dyn CanonicalStore>,
        resolver: Arc<dyn NameResolver>,
        index: Arc<dyn SearchIndex>,
        progress: ProgressStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            index,
            progress,
            settings,
        }
    }

    /// Classify every record of a list and rebuild its documents.
    ///
    /// With `rematch` the resolver is asked for every record and the results
    /// are stored; without it existing classifications are reused. Failures on
    /// single records are logged and skipped. A store failure aborts the run,
    /// leaving already written batches in place.
    #[instrument(skip(self))]
    pub async fn match_and_index(&self, list_id: Uuid, rematch: bool) -> anyhow::Result<JobSummary> {
        let list = self
            .store
            .get_list(list_id)
            .await?
            .ok_or_else(|| anyhow!("species list {list_id} not found"))?;

        let progress = self.progress.list(list_id).await;
        let total = self.store.count_records(list_id).await?;
        progress.restart_matching(total as u64);

        match self.run(&list, rematch, &progress).await {
            Ok(summary) => {
                progress.set_stage(IngestStage::Complete);
                info!(
                    %list_id,
                    records = summary.records_processed,
                    indexed = summary.records_indexed,
                    failed = summary.records_failed,
                    distinct_matches = summary.distinct_matches,
                    "Matching and indexing complete"
                );
                Ok(summary)
            },
            Err(e) => {
                progress.set_stage(IngestStage::Failed);
                Err(e)
            },
        }
    }

    /// Run [`Self::match_and_index`] over every list in store order
    #[instrument(skip(self))]
    pub async fn match_and_index_all(&self, rematch: bool) -> anyhow::Result<JobSummary> {
        let total = self.store.count_lists().await?;
        self.progress.start_migration(total as u64);
        info!(lists = total, rematch, "Matching all lists");

        let page_size = self.settings.page_size.max(1);
        let mut summary = JobSummary::default();
        let mut offset = 0;
        loop {
            let lists = self
                .store
                .lists_page(offset, page_size)
                .await
                .context("Failed to page through species lists")?;
            if lists.is_empty() {
                break;
            }
            offset += lists.len();

            for list in &lists {
                match self.match_and_index(list.id, rematch).await {
                    Ok(list_summary) => {
                        self.progress.migration_rows(list_summary.records_processed);
                        summary.absorb(&list_summary);
                    },
                    Err(e) => warn!(list_id = %list.id, error = %e, "Skipping list"),
                }
                self.progress.migration_list_done();
            }

            if lists.len() < page_size {
                break;
            }
        }

        Ok(summary)
    }

    async fn run(&self, list: &SpeciesList, rematch: bool, progress: &ListProgress) -> anyhow::Result<JobSummary> {
        let mut run = ListRun {
            list,
            rematch,
            progress,
            writer: BulkWriter::new(Arc::clone(&self.index), self.settings.bulk_batch_size),
            concepts: HashSet::new(),
            summary: JobSummary {
                lists_processed: 1,
                ..Default::default()
            },
        };

        let page_size = self.settings.page_size.max(1);
        let mut offset = 0;
        loop {
            let page = self.store.records_page(list.id, offset, page_size).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for record in &page {
                run.summary.records_processed += 1;
                if let Err(e) = self.process(&mut run, record).await {
                    warn!(record_id = %record.id, error = %e, "Skipping record");
                    run.summary.records_failed += 1;
                    progress.add_failed(1);
                }
            }

            if page.len() < page_size {
                break;
            }
        }

        let ListRun {
            writer,
            concepts,
            mut summary,
            ..
        } = run;

        let outcome = writer.finish().await?;
        summary.records_indexed = outcome.indexed as u64;
        summary.records_failed += outcome.failed as u64;
        summary.distinct_matches = concepts.len() as u64;

        if rematch {
            let rows = self.store.count_records(list.id).await?;
            self.store
                .set_list_counts(list.id, rows, concepts.len() as i64)
                .await?;
        }

        Ok(summary)
    }

    async fn process(&self, run: &mut ListRun<'_>, record: &ListRecord) -> anyhow::Result<()> {
        let classification = self.classify(record, run.rematch).await?;
        if let Some(classification) = &classification {
            run.progress.add_matched(1);
            if let Some(concept) = classification.matched_concept() {
                run.concepts.insert(concept.to_string());
            }
        }

        let document = IndexDocument::project(run.list, record, classification.as_ref());
        run.writer.push(document).await?;
        run.progress.add_indexed(1);
        Ok(())
    }

    async fn classify(&self, record: &ListRecord, rematch: bool) -> anyhow::Result<Option<Classification>> {
        if !rematch {
            if let Some(existing) = &record.classification {
                return Ok(Some(existing.clone()));
            }
        }

        let Some(query) = NameQuery::from_record(record) else {
            debug!(record_id = %record.id, "No scientific name to match");
            return Ok(None);
        };

        let classification = self.resolver.resolve(&query).await?;
        if rematch {
            self.store.set_classification(record.id, &classification).await?;
        }
        Ok(Some(classification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::index::SearchRequest;
    use crate::models::{ListMetadata, ListType, TaxonColumn, TaxonFields};
    use crate::search::query::Query;

    async fn seed(harness: &TestHarness, names: &[&str]) -> SpeciesList {
        let list = SpeciesList::new(ListMetadata::new("Mammals", ListType::LocalList), "user-1");
        harness.state.store.insert_list(&list).await.unwrap();
        let records: Vec<ListRecord> = names
            .iter()
            .map(|name| {
                let mut taxon = TaxonFields::default();
                taxon.set(TaxonColumn::ScientificName, *name);
                ListRecord::new(list.id, taxon, vec![])
            })
            .collect();
        harness.state.store.insert_records(&records).await.unwrap();
        list
    }

    #[tokio::test]
    async fn test_rematch_persists_and_counts() {
        let harness = TestHarness::new();
        harness.resolver.add_match("Vulpes vulpes", "urn:fox");
        harness.resolver.add_match("Felis catus", "urn:cat");
        let list = seed(&harness, &["Vulpes vulpes", "Felis catus", "Nonexistus fakeus"]).await;

        let summary = harness.state.matcher.match_and_index(list.id, true).await.unwrap();
        assert_eq!(summary.records_processed, 3);
        assert_eq!(summary.records_indexed, 3);
        assert_eq!(summary.distinct_matches, 2);

        let stored = harness.state.store.get_list(list.id).await.unwrap().unwrap();
        assert_eq!(stored.distinct_match_count, 2);
        assert_eq!(stored.row_count, 3);

        let records = harness.state.store.records_page(list.id, 0, 10).await.unwrap();
        assert!(records.iter().all(|r| r.classification.is_some()));

        // unmatched names stay searchable
        let hits = harness
            .index
            .search(&SearchRequest::new(Query::term("classification.success", false)))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);

        let progress = harness.state.progress.get(list.id).await.unwrap();
        assert_eq!(progress.stage, IngestStage::Complete);
        assert_eq!(progress.rows_indexed, 3);
    }

    #[tokio::test]
    async fn test_reindex_reuses_existing_classification() {
        let harness = TestHarness::new();
        harness.resolver.add_match("Vulpes vulpes", "urn:fox");
        let list = seed(&harness, &["Vulpes vulpes"]).await;
        harness.state.matcher.match_and_index(list.id, true).await.unwrap();
        let calls = harness.resolver.calls();

        let summary = harness.state.matcher.match_and_index(list.id, false).await.unwrap();
        assert_eq!(summary.records_indexed, 1);
        assert_eq!(harness.resolver.calls(), calls);
    }

    #[tokio::test]
    async fn test_record_failure_is_skipped() {
        let harness = TestHarness::new();
        harness.resolver.add_match("Vulpes vulpes", "urn:fox");
        harness.resolver.add_failure("Canis lupus");
        let list = seed(&harness, &["Vulpes vulpes", "Canis lupus"]).await;

        let summary = harness.state.matcher.match_and_index(list.id, true).await.unwrap();
        assert_eq!(summary.records_failed, 1);
        assert_eq!(summary.records_indexed, 1);
        assert_eq!(harness.index.len().await, 1);
    }

    #[tokio::test]
    async fn test_match_all_updates_migration_progress() {
        let harness = TestHarness::with_page_size(1);
        seed(&harness, &["Vulpes vulpes", "Felis catus"]).await;
        seed(&harness, &["Canis lupus"]).await;

        let summary = harness.state.matcher.match_and_index_all(false).await.unwrap();
        assert_eq!(summary.lists_processed, 2);
        assert_eq!(summary.records_processed, 3);

        let migration = harness.state.progress.migration();
        assert_eq!(migration.lists_total, 2);
        assert_eq!(migration.lists_processed, 2);
        assert_eq!(migration.rows_processed, 3);
    }

    #[tokio::test]
    async fn test_missing_list_fails() {
        let harness = TestHarness::new();
        assert!(harness.state.matcher.match_and_index(Uuid::new_v4(), false).await.is_err());
    }
}
