//! Search index
//!
//! Every record is projected into a flat [`IndexDocument`] carrying its list's
//! attributes, its taxonomic fields, its classification and its property bag.
//! The [`SearchIndex`] trait hides the engine: [`ElasticIndex`] talks to an
//! Elasticsearch-compatible cluster, [`MemoryIndex`] evaluates the same query
//! AST in process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::search::query::Query;

pub mod document;
pub mod elastic;
pub mod memory;
pub mod sync;

pub use document::{CoreField, FieldKind, IndexDocument, CORE_FIELDS};
pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;
pub use sync::{BulkWriter, IndexSynchronizer};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Search engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search engine returned {status}: {body}")]
    Engine { status: u16, body: String },

    #[error("Search serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Result window {requested} exceeds the maximum of {max}")]
    ResultWindowExceeded { requested: u64, max: u64 },

    #[error("Unexpected search response: {0}")]
    Response(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Term counts requested alongside a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aggregation {
    /// Counts over a core field's exact values
    Field { name: String, field: String, size: usize },
    /// Counts over the values of one property key
    Property { key: String, size: usize },
}

impl Aggregation {
    pub fn name(&self) -> &str {
        match self {
            Aggregation::Field { name, .. } => name,
            Aggregation::Property { key, .. } => key,
        }
    }
}

/// A fully built search, ready for an engine
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub from: u64,
    pub size: u64,
    pub aggregations: Vec<Aggregation>,
    /// Keep only the best hit per distinct value of this field
    pub collapse: Option<String>,
}

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            from: 0,
            size: 20,
            aggregations: Vec::new(),
            collapse: None,
        }
    }

    /// Last result position the request touches
    pub fn window_end(&self) -> u64 {
        self.from.saturating_add(self.size)
    }

    /// Fail if the request reaches past `max_result_window`
    pub fn check_window(&self, max_result_window: u64) -> IndexResult<()> {
        let requested = self.window_end();
        if requested > max_result_window {
            return Err(IndexError::ResultWindowExceeded {
                requested,
                max: max_result_window,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub score: f32,
    pub document: IndexDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub buckets: Vec<FacetBucket>,
}

/// Matching documents for one page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    /// Total matching documents, before collapsing and paging
    pub total: u64,
    pub hits: Vec<Hit>,
    pub facets: Vec<Facet>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub failed: usize,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index and its mapping when missing
    async fn ensure_index(&self) -> IndexResult<()>;

    /// Insert or replace documents by id
    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> IndexResult<BulkOutcome>;

    /// Remove every document of a list, returning how many went
    async fn delete_by_list(&self, list_id: Uuid) -> IndexResult<u64>;

    async fn delete_document(&self, record_id: Uuid) -> IndexResult<bool>;

    /// Run a search. Requests past the result window are rejected.
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchHits>;

    fn max_result_window(&self) -> u64;
}
