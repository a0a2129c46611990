//! Builds record and list-name searches
//!
//! Filters on the same field are alternatives; filters on different fields
//! must all hold. The caller's visibility filter is always appended.

use std::sync::Arc;
use thiserror::Error;

use super::query::{BoolQuery, Query};
use super::visibility::{visibility_filter, AccessPolicy, CallerContext};
use crate::features::shared::pagination::{PaginationError, PaginationParams};
use crate::index::document::{CoreField, FieldKind, ALL_FIELD, PROPERTIES_PATH};
use crate::index::{Aggregation, SearchRequest};

pub const FREE_TEXT_BOOST: f32 = 2.0;
pub const DEFAULT_FACET_SIZE: usize = 30;

const LIST_NAME_FIELD: &str = "speciesListName";
const LIST_ID_FIELD: &str = "speciesListID";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Pagination(#[from] PaginationError),

    #[error("Invalid value {value:?} for filter {field}")]
    InvalidFilter { field: String, value: String },
}

/// A field/value constraint. Core fields match their exact value; any other
/// name is a property key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Parameters of a record search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSearch {
    pub free_text: Option<String>,
    pub filters: Vec<Filter>,
    /// Limit free-text matching to these fields
    pub restrict_fields: Option<Vec<String>>,
    /// Core fields or property keys to count values of
    pub facets: Vec<String>,
    pub pagination: PaginationParams,
}

#[derive(Clone)]
pub struct QueryBuilder {
    policy: Arc<dyn AccessPolicy>,
    max_result_window: u64,
    facet_size: usize,
}

impl QueryBuilder {
    pub fn new(policy: Arc<dyn AccessPolicy>, max_result_window: u64) -> Self {
        Self {
            policy,
            max_result_window,
            facet_size: DEFAULT_FACET_SIZE,
        }
    }

    pub fn policy(&self) -> &dyn AccessPolicy {
        self.policy.as_ref()
    }

    pub fn max_result_window(&self) -> u64 {
        self.max_result_window
    }

    /// Search over records, scoped to what the caller may see
    pub fn record_query(&self, search: &RecordSearch, caller: &CallerContext) -> Result<SearchRequest, QueryError> {
        search.pagination.validate(self.max_result_window)?;

        let mut root = BoolQuery::new();

        if let Some(text) = non_blank(search.free_text.as_deref()) {
            match search.restrict_fields.as_deref() {
                Some(fields) if !fields.is_empty() => {
                    root = root.must(restricted_match(fields, text));
                },
                _ => {
                    root = root.should(Query::phrase_prefix(ALL_FIELD, text).boosted(FREE_TEXT_BOOST));
                    if text.chars().count() > 1 {
                        root = root.minimum_should_match(1);
                    }
                },
            }
        }

        let mut groups: Vec<(&str, Vec<Query>)> = Vec::new();
        for filter in &search.filters {
            let clause = filter_clause(filter)?;
            match groups.iter_mut().find(|(field, _)| *field == filter.field) {
                Some((_, clauses)) => clauses.push(clause),
                None => groups.push((filter.field.as_str(), vec![clause])),
            }
        }
        for (_, mut clauses) in groups {
            let clause = if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                BoolQuery::any_of(clauses).build()
            };
            root = root.filter(clause);
        }

        root = self.scoped(root, caller);

        let mut request = self.paged(finish(root), &search.pagination);
        request.aggregations = search
            .facets
            .iter()
            .map(|name| self.aggregation(name))
            .collect();
        Ok(request)
    }

    /// Search lists by name, one hit per list
    pub fn list_name_query(
        &self,
        text: Option<&str>,
        pagination: &PaginationParams,
        caller: &CallerContext,
    ) -> Result<SearchRequest, QueryError> {
        pagination.validate(self.max_result_window)?;

        let mut root = BoolQuery::new();
        if let Some(text) = non_blank(text) {
            root = root
                .should(Query::phrase(LIST_NAME_FIELD, text).boosted(10.0))
                .should(Query::phrase_prefix(format!("{LIST_NAME_FIELD}.search"), text).boosted(5.0))
                .should(Query::fuzzy(LIST_NAME_FIELD, text).boosted(2.0))
                .should(Query::matches(ALL_FIELD, text))
                .minimum_should_match(1);
        }
        root = self.scoped(root, caller);

        let mut request = self.paged(finish(root), pagination);
        request.collapse = Some(LIST_ID_FIELD.to_string());
        Ok(request)
    }

    fn scoped(&self, root: BoolQuery, caller: &CallerContext) -> BoolQuery {
        match visibility_filter(self.policy.as_ref(), caller) {
            Some(visibility) => root.filter(visibility),
            None => root,
        }
    }

    fn paged(&self, query: Query, pagination: &PaginationParams) -> SearchRequest {
        let mut request = SearchRequest::new(query);
        request.from = pagination.offset() as u64;
        request.size = pagination.per_page() as u64;
        request
    }

    fn aggregation(&self, name: &str) -> Aggregation {
        match CoreField::lookup(name) {
            Some(field) => Aggregation::Field {
                name: name.to_string(),
                field: field.exact_path(),
                size: self.facet_size,
            },
            None => Aggregation::Property {
                key: name.to_string(),
                size: self.facet_size,
            },
        }
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

fn finish(root: BoolQuery) -> Query {
    if root == BoolQuery::default() {
        Query::MatchAll
    } else {
        root.build()
    }
}

fn property_query(key: &str, value: Query) -> Query {
    Query::nested(
        PROPERTIES_PATH,
        BoolQuery::new()
            .must(Query::term("properties.key", key))
            .must(value)
            .build(),
    )
}

fn filter_clause(filter: &Filter) -> Result<Query, QueryError> {
    let Some(field) = CoreField::lookup(&filter.field) else {
        return Ok(property_query(
            &filter.field,
            Query::term("properties.value", filter.value.as_str()),
        ));
    };

    match field.kind {
        FieldKind::Boolean => {
            let value: bool = filter
                .value
                .trim()
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| QueryError::InvalidFilter {
                    field: filter.field.clone(),
                    value: filter.value.clone(),
                })?;
            Ok(Query::term(field.exact_path(), value))
        },
        FieldKind::Text | FieldKind::Keyword => Ok(Query::term(field.exact_path(), filter.value.as_str())),
    }
}

/// Free text limited to an allow-list of fields, as one disjunction
fn restricted_match(fields: &[String], text: &str) -> Query {
    let clauses = fields
        .iter()
        .filter_map(|name| match CoreField::lookup(name) {
            Some(field) => field.search_path().map(|path| Query::phrase_prefix(path, text)),
            None => Some(property_query(name, Query::phrase_prefix("properties.value.search", text))),
        })
        .collect();
    BoolQuery::any_of(clauses).build()
}
