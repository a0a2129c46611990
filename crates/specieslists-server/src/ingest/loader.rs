//! Checklist loader
//!
//! Parses the whole upload before writing anything, so a malformed file never
//! leaves half a list behind. Records are then written in pages and the list's
//! schema is updated with a compare-and-swap.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::facets::FacetTracker;
use super::normalize::{ColumnPlan, ColumnRole, FieldNormalizer};
use super::reader::DelimitedRows;
use super::{IngestError, IngestJob, IngestOptions, IngestOutcome, Upload, ValidationWarning};
use crate::config::PipelineSettings;
use crate::db::{CanonicalStore, DbError};
use crate::jobs::{IngestStage, JobDispatcher, ProgressStore};
use crate::models::{ListRecord, Property, SpeciesList, TaxonColumn, TaxonFields};

/// Attempts at the final list update before giving up on concurrent edits
const MAX_SCHEMA_UPDATE_ATTEMPTS: usize = 3;

struct ParsedChecklist {
    records: Vec<ListRecord>,
    job: IngestJob,
}

#[derive(Clone)]
pub struct Loader {
    store: Arc<dyn CanonicalStore>,
    dispatcher: JobDispatcher,
    progress: ProgressStore,
    normalizer: Arc<FieldNormalizer>,
    settings: PipelineSettings,
}

impl Loader {
    pub fn new(
        store: Arc<dyn CanonicalStore>,
        dispatcher: JobDispatcher,
        progress: ProgressStore,
        settings: PipelineSettings,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            dispatcher,
            progress,
            normalizer: Arc::new(FieldNormalizer::new()?),
            settings,
        })
    }

    pub fn normalizer(&self) -> &FieldNormalizer {
        &self.normalizer
    }

    /// Ingest an upload into a list.
    ///
    /// The format is checked before anything else. A dry run parses and
    /// summarises the upload without touching the store and accepts a missing
    /// list id as a schema preview.
    #[instrument(skip(self, upload), fields(file = ?upload.file_name, dry_run = options.dry_run))]
    pub async fn ingest(
        &self,
        list_id: Option<Uuid>,
        upload: &Upload,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        let format = upload.format()?;

        let list = match (list_id, options.dry_run) {
            (None, false) => return Err(IngestError::ListIdRequired),
            (Some(id), false) => Some(
                self.store
                    .get_list(id)
                    .await?
                    .ok_or(IngestError::ListNotFound(id))?,
            ),
            (_, true) => None,
        };

        let rows = DelimitedRows::open(upload, format)?;
        let parsed = self.parse(list_id, rows)?;

        info!(
            %format,
            rows = parsed.job.row_count,
            unmatched = parsed.job.unmatched_count,
            fields = parsed.job.field_list.len(),
            facets = parsed.job.facet_list.len(),
            "Checklist parsed"
        );

        let Some(list) = list else {
            return Ok(IngestOutcome {
                job: parsed.job,
                list: None,
                indexing: None,
            });
        };

        self.persist(list, parsed, options).await
    }

    async fn persist(
        &self,
        list: SpeciesList,
        parsed: ParsedChecklist,
        options: IngestOptions,
    ) -> Result<IngestOutcome, IngestError> {
        let ParsedChecklist { records, job } = parsed;
        let list_id = list.id;

        let progress = if options.is_migration {
            None
        } else {
            let progress = self.progress.start(list_id).await;
            progress.set_total(records.len() as u64);
            Some(progress)
        };

        for page in records.chunks(self.settings.page_size.max(1)) {
            if let Err(e) = self.store.insert_records(page).await {
                if let Some(progress) = &progress {
                    progress.set_stage(IngestStage::Failed);
                }
                return Err(e.into());
            }
            match &progress {
                Some(progress) => progress.add_ingested(page.len() as u64),
                None => self.progress.migration_rows(page.len() as u64),
            }
        }

        let list = self.update_schema(list, &job).await?;

        let indexing = if options.skip_indexing || options.is_migration {
            if let Some(progress) = &progress {
                progress.set_stage(IngestStage::Complete);
            }
            None
        } else {
            match self.dispatcher.match_and_index(list_id, true) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(%list_id, error = %e, "Could not schedule matching; records are stored but not yet indexed");
                    None
                },
            }
        };

        info!(%list_id, version = list.version, rows = job.row_count, "Checklist ingested");

        Ok(IngestOutcome {
            job,
            list: Some(list),
            indexing,
        })
    }

    /// Replace the list's field list, facet list and row count
    async fn update_schema(&self, mut list: SpeciesList, job: &IngestJob) -> Result<SpeciesList, IngestError> {
        let list_id = list.id;
        let mut attempt = 1;
        loop {
            list.field_list = job.field_list.clone();
            list.facet_list = job.facet_list.clone();
            list.row_count = self.store.count_records(list_id).await?;

            match self.store.update_list(&list).await {
                Ok(updated) => return Ok(updated),
                Err(DbError::VersionConflict { .. }) if attempt < MAX_SCHEMA_UPDATE_ATTEMPTS => {
                    attempt += 1;
                    list = self
                        .store
                        .get_list(list_id)
                        .await?
                        .ok_or(IngestError::ListNotFound(list_id))?;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn parse(&self, list_id: Option<Uuid>, rows: DelimitedRows) -> Result<ParsedChecklist, IngestError> {
        let columns = self.normalizer.plan(rows.headers());

        let mut field_list: Vec<String> = Vec::new();
        let mut original_field_names = Vec::new();
        for column in &columns {
            if let ColumnRole::Property(key) = &column.role {
                if !field_list.contains(key) {
                    field_list.push(key.clone());
                }
                original_field_names.push(column.original.clone());
            }
        }

        let mut tracker = FacetTracker::new(
            self.settings.facet_max_distinct,
            self.settings.facet_max_value_length,
        );
        let owner = list_id.unwrap_or_else(Uuid::nil);
        let mut records = Vec::new();
        let mut unmatched = 0i64;

        for row in rows {
            let cells = row?;
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            let record = build_record(owner, &columns, &cells, &mut tracker);
            if record.taxon.lacks_identifier() {
                unmatched += 1;
            }
            records.push(record);
        }

        let row_count = records.len() as i64;
        let facet_list = tracker.facets(&field_list);
        let validation_warnings = ValidationWarning::for_counts(row_count, unmatched)
            .into_iter()
            .collect();

        Ok(ParsedChecklist {
            records,
            job: IngestJob {
                list_id,
                field_list,
                facet_list,
                original_field_names,
                row_count,
                unmatched_count: unmatched,
                validation_warnings,
            },
        })
    }
}

/// One row to a record. Blank cells are dropped; the first non-blank value
/// wins when two columns clean to the same key.
fn build_record(list_id: Uuid, columns: &[ColumnPlan], cells: &[String], tracker: &mut FacetTracker) -> ListRecord {
    let mut taxon = TaxonFields::default();
    let mut supplied_name = None;
    let mut properties: Vec<Property> = Vec::new();

    for (column, cell) in columns.iter().zip(cells) {
        if cell.is_empty() {
            continue;
        }
        match &column.role {
            ColumnRole::Taxon(field) => {
                if taxon.get(*field).is_none() {
                    taxon.set(*field, cell.as_str());
                }
            },
            ColumnRole::SuppliedName => supplied_name = Some(cell.clone()),
            ColumnRole::Property(key) => {
                if !properties.iter().any(|p| &p.key == key) {
                    tracker.observe(key, cell);
                    properties.push(Property::new(key.clone(), cell.clone()));
                }
            },
        }
    }

    if let Some(name) = supplied_name {
        taxon.set(TaxonColumn::ScientificName, name);
    }

    ListRecord::new(list_id, taxon, properties)
}
