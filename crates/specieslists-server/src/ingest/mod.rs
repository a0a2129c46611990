//! Checklist ingestion
//!
//! The [`Loader`] reads an uploaded checklist, splits reserved taxonomic
//! columns from the free-form property bag, discovers the list's field and
//! facet schema and persists the rows as canonical records. Matching and
//! indexing are handed to the job pool afterwards.
//!
//! ```text
//! Upload -> DelimitedRows -> FieldNormalizer -> FacetTracker -> CanonicalStore
//!                                                                  |
//!                                                   JobDispatcher (match + index)
//! ```

use serde::{Deserialize, Serialize};
use specieslists_common::format::UploadFormat;
use specieslists_common::CommonError;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbError;
use crate::jobs::JobHandle;
use crate::models::SpeciesList;

pub mod facets;
pub mod loader;
pub mod normalize;
pub mod reader;

pub use facets::FacetTracker;
pub use loader::Loader;
pub use normalize::{ColumnPlan, ColumnRole, FieldNormalizer};
pub use reader::DelimitedRows;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Format(#[from] CommonError),

    #[error("Failed to parse delimited data: {0}")]
    Parse(#[from] csv::Error),

    #[error("Failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive contains no .csv, .tsv or .txt entry")]
    EmptyArchive,

    #[error("Upload has no header row")]
    MissingHeader,

    #[error("A list id is required unless this is a dry run")]
    ListIdRequired,

    #[error("List '{0}' not found")]
    ListNotFound(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl IngestError {
    /// Problems with the uploaded file itself, as opposed to backend failures
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IngestError::Format(_)
                | IngestError::Parse(_)
                | IngestError::Archive(_)
                | IngestError::EmptyArchive
                | IngestError::MissingHeader
        )
    }
}

/// An uploaded checklist file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            content_type: None,
            data,
        })
    }

    pub fn format(&self) -> Result<UploadFormat, CommonError> {
        UploadFormat::detect(self.content_type.as_deref(), self.file_name.as_deref())
    }
}

/// Non-fatal data quality findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationWarning {
    AllRecordsWithoutScientificName,
    SomeRecordsWithoutScientificName,
}

impl ValidationWarning {
    pub fn for_counts(row_count: i64, unmatched: i64) -> Option<Self> {
        if unmatched <= 0 {
            None
        } else if unmatched >= row_count {
            Some(Self::AllRecordsWithoutScientificName)
        } else {
            Some(Self::SomeRecordsWithoutScientificName)
        }
    }
}

/// Summary of one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    #[serde(rename = "speciesListID")]
    pub list_id: Option<Uuid>,
    pub field_list: Vec<String>,
    pub facet_list: Vec<String>,
    /// Property headers as uploaded, before cleaning
    pub original_field_names: Vec<String>,
    pub row_count: i64,
    pub unmatched_count: i64,
    pub validation_warnings: Vec<ValidationWarning>,
}

/// Ingestion switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    /// Parse and summarise without persisting anything
    pub dry_run: bool,
    /// Persist records but do not schedule matching and indexing
    pub skip_indexing: bool,
    /// Part of a bulk migration; progress is reported globally
    pub is_migration: bool,
}

impl IngestOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }
}

/// Result of [`Loader::ingest`]
#[derive(Debug)]
pub struct IngestOutcome {
    pub job: IngestJob,
    /// The list after its schema was updated; `None` for dry runs
    pub list: Option<SpeciesList>,
    /// Matching and indexing job, when one was scheduled
    pub indexing: Option<JobHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_for_counts() {
        assert_eq!(ValidationWarning::for_counts(3, 0), None);
        assert_eq!(
            ValidationWarning::for_counts(3, 1),
            Some(ValidationWarning::SomeRecordsWithoutScientificName)
        );
        assert_eq!(
            ValidationWarning::for_counts(1, 1),
            Some(ValidationWarning::AllRecordsWithoutScientificName)
        );
    }

    #[test]
    fn test_warning_serializes_as_code() {
        let json = serde_json::to_string(&ValidationWarning::AllRecordsWithoutScientificName).unwrap();
        assert_eq!(json, "\"ALL_RECORDS_WITHOUT_SCIENTIFIC_NAME\"");
    }

    #[test]
    fn test_upload_format() {
        assert_eq!(Upload::new("a.csv", "x").format().unwrap(), UploadFormat::Csv);
        assert!(Upload::new("a.xlsx", "x").format().is_err());
        let upload = Upload::new("blob", "x").with_content_type("text/tab-separated-values");
        assert_eq!(upload.format().unwrap(), UploadFormat::Tsv);
    }

    #[test]
    fn test_input_errors() {
        assert!(IngestError::MissingHeader.is_input_error());
        assert!(!IngestError::ListIdRequired.is_input_error());
    }
}
