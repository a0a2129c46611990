//! Keeps the search index in step with the canonical store

use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{BulkOutcome, IndexDocument, IndexResult, SearchIndex};
use crate::db::CanonicalStore;
use crate::error::AppResult;
use crate::jobs::{JobDispatcher, JobError, JobHandle};
use crate::models::{ListRecord, SpeciesList};

/// Buffers documents and writes them in fixed-size bulk requests
pub struct BulkWriter {
    index: Arc<dyn SearchIndex>,
    batch_size: usize,
    buffer: Vec<IndexDocument>,
    outcome: BulkOutcome,
}

impl BulkWriter {
    pub fn new(index: Arc<dyn SearchIndex>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            index,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            outcome: BulkOutcome::default(),
        }
    }

    pub async fn push(&mut self, document: IndexDocument) -> IndexResult<()> {
        self.buffer.push(document);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> IndexResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let outcome = self.index.bulk_upsert(&batch).await?;
        debug!(indexed = outcome.indexed, failed = outcome.failed, "Flushed bulk batch");
        self.outcome.indexed += outcome.indexed;
        self.outcome.failed += outcome.failed;
        Ok(())
    }

    /// Flush the trailing partial batch and return the totals
    pub async fn finish(mut self) -> IndexResult<BulkOutcome> {
        self.flush().await?;
        Ok(self.outcome)
    }
}

#[derive(Clone)]
pub struct IndexSynchronizer {
    store: Arc<dyn CanonicalStore>,
    index: Arc<dyn SearchIndex>,
    dispatcher: JobDispatcher,
}

impl IndexSynchronizer {
    pub fn new(store: Arc<dyn CanonicalStore>, index: Arc<dyn SearchIndex>, dispatcher: JobDispatcher) -> Self {
        Self {
            store,
            index,
            dispatcher,
        }
    }

    /// Schedule a rebuild of one list's documents without re-matching
    pub fn reindex(&self, list_id: Uuid) -> Result<JobHandle, JobError> {
        self.dispatcher.match_and_index(list_id, false)
    }

    pub fn reindex_all(&self) -> Result<JobHandle, JobError> {
        self.dispatcher.match_and_index_all(false)
    }

    /// Whether a metadata change alters attributes copied onto every document
    pub fn requires_reindex(before: &SpeciesList, after: &SpeciesList) -> bool {
        let (a, b) = (&before.metadata, &after.metadata);
        a.title != b.title
            || a.list_type != b.list_type
            || a.is_private != b.is_private
            || a.is_authoritative != b.is_authoritative
            || a.is_threatened != b.is_threatened
            || a.is_invasive != b.is_invasive
            || a.region != b.region
            || a.tags != b.tags
            || before.owner != after.owner
            || before.editors != after.editors
    }

    /// Write a single record's document immediately
    pub async fn index_record(&self, list: &SpeciesList, record: &ListRecord) -> IndexResult<()> {
        let document = IndexDocument::project(list, record, record.classification.as_ref());
        self.index.bulk_upsert(std::slice::from_ref(&document)).await?;
        Ok(())
    }

    /// Remove a list, its records and its documents. Releases stay.
    #[instrument(skip(self))]
    pub async fn delete_list(&self, list_id: Uuid) -> AppResult<bool> {
        let records = self.store.delete_records_for_list(list_id).await?;
        let existed = self.store.delete_list(list_id).await?;
        let documents = self.index.delete_by_list(list_id).await?;
        info!(records, documents, existed, "Deleted list");
        Ok(existed)
    }

    #[instrument(skip(self))]
    pub async fn delete_record(&self, record_id: Uuid) -> AppResult<bool> {
        let existed = self.store.delete_record(record_id).await?;
        self.index.delete_document(record_id).await?;
        Ok(existed)
    }
}
