//! List-name search
//!
//! Exact phrase matches on the list name rank above prefix matches, which
//! rank above fuzzy matches and then any match in the record text. Hits are
//! collapsed to one per list.

use serde::{Deserialize, Serialize};

use crate::features::shared::pagination::PaginationParams;
use crate::features::FeatureState;
use crate::index::{IndexDocument, IndexError};
use crate::models::ListType;
use crate::search::{CallerContext, QueryError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchListsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub pagination: PaginationParams,
}

/// List attributes as carried on its documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    #[serde(rename = "speciesListID")]
    pub species_list_id: String,
    pub title: String,
    pub list_type: ListType,
    pub is_private: bool,
    pub is_authoritative: bool,
    pub is_threatened: bool,
    pub is_invasive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub owner: String,
    pub tags: Vec<String>,
    pub score: f32,
}

impl ListSummary {
    fn from_document(document: IndexDocument, score: f32) -> Self {
        Self {
            species_list_id: document.species_list_id,
            title: document.species_list_name,
            list_type: document.list_type,
            is_private: document.is_private,
            is_authoritative: document.is_authoritative,
            is_threatened: document.is_threatened,
            is_invasive: document.is_invasive,
            region: document.region,
            owner: document.owner,
            tags: document.tags,
            score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListsResponse {
    pub items: Vec<ListSummary>,
    pub page: i64,
    pub per_page: i64,
    /// Matching records across all lists, before collapsing
    pub matching_records: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchListsError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
}

#[tracing::instrument(skip(state))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    query: SearchListsQuery,
) -> Result<SearchListsResponse, SearchListsError> {
    let request = state
        .queries
        .list_name_query(query.text.as_deref(), &query.pagination, caller)?;
    let hits = state.index.search(&request).await?;

    Ok(SearchListsResponse {
        items: hits
            .hits
            .into_iter()
            .map(|hit| ListSummary::from_document(hit.document, hit.score))
            .collect(),
        page: query.pagination.page(),
        per_page: query.pagination.per_page(),
        matching_records: hits.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CanonicalStore;
    use crate::features::shared::pagination::PaginationError;
    use crate::features::shared::test_helpers::TestHarness;
    use crate::models::{ListRecord, SpeciesList, TaxonColumn, TaxonFields};

    async fn seed(harness: &TestHarness, list: &SpeciesList, names: &[&str]) {
        let records: Vec<ListRecord> = names
            .iter()
            .map(|name| {
                let mut taxon = TaxonFields::default();
                taxon.set(TaxonColumn::ScientificName, *name);
                ListRecord::new(list.id, taxon, vec![])
            })
            .collect();
        harness.store.insert_records(&records).await.unwrap();
        harness.state.matcher.match_and_index(list.id, true).await.unwrap();
    }

    fn text(text: &str) -> SearchListsQuery {
        SearchListsQuery {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_one_hit_per_list_exact_name_first() {
        let harness = TestHarness::new();
        let garden = harness.list("Garden birds", "alice").await;
        let sea = harness.list("Sea birds of Tasmania", "alice").await;
        seed(&harness, &garden, &["Pica pica", "Corvus corax", "Turdus merula"]).await;
        seed(&harness, &sea, &["Morus serrator"]).await;

        let response = handle(&harness.state, &CallerContext::anonymous(), text("Garden birds"))
            .await
            .unwrap();

        let ids: Vec<&str> = response.items.iter().map(|s| s.species_list_id.as_str()).collect();
        assert_eq!(ids.first().copied(), Some(garden.id.to_string().as_str()));
        let distinct: std::collections::HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[tokio::test]
    async fn test_private_lists_hidden() {
        let harness = TestHarness::new();
        let hidden = harness.private_list("Orchid sites", "bob").await;
        seed(&harness, &hidden, &["Caladenia tutelata"]).await;

        let anonymous = handle(&harness.state, &CallerContext::anonymous(), text("Orchid"))
            .await
            .unwrap();
        assert!(anonymous.items.is_empty());

        let owner = handle(&harness.state, &CallerContext::user("bob"), text("Orchid"))
            .await
            .unwrap();
        assert_eq!(owner.items.len(), 1);
        assert_eq!(owner.items[0].title, "Orchid sites");
    }

    #[tokio::test]
    async fn test_window_rejected() {
        let harness = TestHarness::new();
        let query = SearchListsQuery {
            text: None,
            pagination: PaginationParams::new(Some(11), Some(1000)),
        };
        let result = handle(&harness.state, &CallerContext::anonymous(), query).await;
        assert!(matches!(
            result,
            Err(SearchListsError::Query(QueryError::Pagination(
                PaginationError::ResultWindowExceeded { .. }
            )))
        ));
    }
}
