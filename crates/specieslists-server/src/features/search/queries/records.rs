//! Faceted record search

use serde::{Deserialize, Serialize};

use crate::features::shared::pagination::PaginationMetadata;
use crate::features::FeatureState;
use crate::index::{Facet, IndexDocument, IndexError};
use crate::search::{CallerContext, QueryError, RecordSearch};

/// Record search
///
/// # Examples
///
/// ```rust,ignore
/// use specieslists_server::features::search::SearchRecordsQuery;
/// use specieslists_server::search::{Filter, RecordSearch};
///
/// // Threatened plants, counted by family
/// let query = SearchRecordsQuery {
///     search: RecordSearch {
///         filters: vec![Filter::new("isThreatened", "true"), Filter::new("kingdom", "Plantae")],
///         facets: vec!["family".to_string()],
///         ..Default::default()
///     },
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchRecordsQuery {
    pub search: RecordSearch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHit {
    pub score: f32,
    #[serde(flatten)]
    pub document: IndexDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecordsResponse {
    pub items: Vec<RecordHit>,
    pub pagination: PaginationMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub facets: Vec<Facet>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchRecordsError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
}

/// Run a record search.
///
/// Requests reaching past the result window are rejected before the index is
/// contacted.
#[tracing::instrument(skip(state, query), fields(text = ?query.search.free_text, filters = query.search.filters.len()))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    query: SearchRecordsQuery,
) -> Result<SearchRecordsResponse, SearchRecordsError> {
    let request = state.queries.record_query(&query.search, caller)?;
    let hits = state.index.search(&request).await?;

    let pagination = PaginationMetadata::from_params(&query.search.pagination, hits.total as i64);
    let items = hits
        .hits
        .into_iter()
        .map(|hit| RecordHit {
            score: hit.score,
            document: hit.document,
        })
        .collect();

    Ok(SearchRecordsResponse {
        items,
        pagination,
        facets: hits.facets,
    })
}
