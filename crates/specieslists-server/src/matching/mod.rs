//! Taxon matching
//!
//! Scientific names are resolved by an external name matching service behind
//! the [`NameResolver`] trait. [`TaxonMatcher`] walks a list's records, attaches
//! classifications and feeds the resulting documents to the search index.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Classification, ListRecord};

pub mod http;
pub mod matcher;

pub use http::HttpNameResolver;
pub use matcher::TaxonMatcher;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Name matching request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Name matching service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not decode name matching response: {0}")]
    Decode(String),
}

/// A name lookup with optional higher-rank hints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameQuery {
    pub scientific_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
}

impl NameQuery {
    pub fn new(scientific_name: impl Into<String>) -> Self {
        Self {
            scientific_name: scientific_name.into(),
            ..Default::default()
        }
    }

    /// Query for a record; `None` when it has no scientific name
    pub fn from_record(record: &ListRecord) -> Option<Self> {
        let taxon = &record.taxon;
        let scientific_name = taxon.scientific_name.clone()?;
        Some(Self {
            scientific_name,
            kingdom: taxon.kingdom.clone(),
            phylum: taxon.phylum.clone(),
            class: taxon.class.clone(),
            order: taxon.order.clone(),
            family: taxon.family.clone(),
            genus: taxon.genus.clone(),
        })
    }
}

/// Resolves names to classifications.
///
/// An unmatched name is not an error: implementations return a
/// [`Classification`] with `success == false`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, query: &NameQuery) -> Result<Classification, ResolveError>;
}
