//! Add or edit a single record

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DbError;
use crate::features::lists::bump_list;
use crate::features::FeatureState;
use crate::ingest::normalize::reserved_column;
use crate::ingest::{ColumnRole, FieldNormalizer};
use crate::matching::NameQuery;
use crate::models::{Classification, ListRecord, Property, SpeciesList, TaxonColumn, TaxonFields};
use crate::search::{can_edit, CallerContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRecordCommand {
    pub list_id: Uuid,
    /// Record to replace; a new record is added when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    pub taxon: TaxonFields,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRecordResponse {
    pub record: ListRecord,
    pub list: SpeciesList,
    pub created: bool,
    /// False when the document could not be written; a reindex repairs it
    pub indexed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UpsertRecordError {
    #[error("A record needs a scientific name, taxon id or taxon concept id")]
    MissingIdentifier,
    #[error("Property key {0:?} is empty after cleaning")]
    InvalidPropertyKey(String),
    #[error("Species list '{0}' not found")]
    ListNotFound(Uuid),
    #[error("Record '{0}' not found in this list")]
    RecordNotFound(Uuid),
    #[error("Caller may not edit species list '{0}'")]
    Forbidden(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl UpsertRecordCommand {
    pub fn validate(&self) -> Result<(), UpsertRecordError> {
        if self.taxon.lacks_identifier() {
            return Err(UpsertRecordError::MissingIdentifier);
        }
        Ok(())
    }

    /// Apply the same header rules as file ingestion to the property keys.
    ///
    /// Reserved keys fill empty taxon fields, "Supplied Name" overrides the
    /// scientific name and the first non-blank value of a key wins.
    pub fn normalized(mut self, normalizer: &FieldNormalizer) -> Result<Self, UpsertRecordError> {
        let mut properties: Vec<Property> = Vec::with_capacity(self.properties.len());
        let mut supplied_name: Option<String> = None;

        for property in std::mem::take(&mut self.properties) {
            let value = property.value.trim();
            if value.is_empty() {
                continue;
            }
            match reserved_column(&property.key) {
                Some(ColumnRole::Taxon(column)) => {
                    if self.taxon.get(column).is_none() {
                        self.taxon.set(column, value);
                    }
                },
                Some(ColumnRole::SuppliedName) => {
                    supplied_name.get_or_insert_with(|| value.to_string());
                },
                Some(ColumnRole::Property(_)) | None => {
                    let key = normalizer
                        .normalize_key(&property.key)
                        .ok_or_else(|| UpsertRecordError::InvalidPropertyKey(property.key.clone()))?;
                    if !properties.iter().any(|p| p.key == key) {
                        properties.push(Property::new(key, value));
                    }
                },
            }
        }

        if let Some(name) = supplied_name {
            self.taxon.set(TaxonColumn::ScientificName, name);
        }
        self.properties = properties;
        Ok(self)
    }
}

/// Store one record, classify it and index it straight away.
///
/// Classification is best effort: a resolver failure leaves the record
/// unclassified. New property keys are appended to the list's field list.
#[tracing::instrument(skip(state, command), fields(list_id = %command.list_id, record_id = ?command.record_id))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: UpsertRecordCommand,
) -> Result<UpsertRecordResponse, UpsertRecordError> {
    let command = command.normalized(state.loader.normalizer())?;
    command.validate()?;

    let list = state
        .store
        .get_list(command.list_id)
        .await?
        .ok_or(UpsertRecordError::ListNotFound(command.list_id))?;
    if !can_edit(state.policy.as_ref(), caller, &list) {
        return Err(UpsertRecordError::Forbidden(list.id));
    }

    let (mut record, created) = match command.record_id {
        Some(record_id) => {
            let mut existing = state
                .store
                .get_record(record_id)
                .await?
                .filter(|r| r.list_id == list.id)
                .ok_or(UpsertRecordError::RecordNotFound(record_id))?;
            existing.taxon = command.taxon;
            existing.properties = command.properties;
            existing.updated_at = chrono::Utc::now();
            (existing, false)
        },
        None => (ListRecord::new(list.id, command.taxon, command.properties), true),
    };

    record.classification = classify(state, &record).await;

    if created {
        state.store.insert_records(std::slice::from_ref(&record)).await?;
    } else {
        state.store.update_record(&record).await?;
    }

    let row_count = state.store.count_records(list.id).await?;
    let keys: Vec<String> = record.properties.iter().map(|p| p.key.clone()).collect();
    let list = bump_list(state.store.as_ref(), list.id, |l| {
        l.merge_fields(&keys);
        l.row_count = row_count;
    })
    .await?;

    let indexed = match state.sync.index_record(&list, &record).await {
        Ok(()) => true,
        Err(e) => {
            warn!(record_id = %record.id, error = %e, "Record stored but not indexed");
            false
        },
    };

    Ok(UpsertRecordResponse {
        record,
        list,
        created,
        indexed,
    })
}

async fn classify(state: &FeatureState, record: &ListRecord) -> Option<Classification> {
    let query = NameQuery::from_record(record)?;
    match state.resolver.resolve(&query).await {
        Ok(classification) => Some(classification),
        Err(e) => {
            debug!(name = %query.scientific_name, error = %e, "Name lookup failed, leaving record unclassified");
            None
        },
    }
}
