//! In-process search index
//!
//! Evaluates the query AST over JSON documents with simple tokenized matching.
//! Relevance is a rough sum of boosts, good enough to order test fixtures and
//! small local datasets the same way the real engine would.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::document::{FieldKind, ALL_FIELD, CORE_FIELDS};
use super::{
    Aggregation, BulkOutcome, Facet, FacetBucket, Hit, IndexDocument, IndexResult, SearchHits,
    SearchIndex, SearchRequest,
};
use crate::search::query::{BoolQuery, Query};

struct StoredDoc {
    document: IndexDocument,
    json: Value,
    /// Lowercased tokens of each value copied into the combined free-text field
    all: Vec<Vec<String>>,
}

pub struct MemoryIndex {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    max_result_window: u64,
}

impl MemoryIndex {
    pub fn new(max_result_window: u64) -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            max_result_window,
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<IndexDocument> {
        self.docs.read().await.get(id).map(|d| d.document.clone())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RESULT_WINDOW)
    }
}

/// Lowercased alphanumeric tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Strip the `.keyword` / `.search` sub-field suffix
fn base_path(field: &str) -> &str {
    field
        .strip_suffix(".keyword")
        .or_else(|| field.strip_suffix(".search"))
        .unwrap_or(field)
}

fn push_flat<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        Value::Null => {},
        other => out.push(other),
    }
}

/// Leaf values at a dotted path, with arrays flattened
fn values_at<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            if let Some(child) = value.get(segment) {
                push_flat(child, &mut next);
            }
        }
        current = next;
    }
    current
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Token runs of the combined field, one per source value so phrases never
/// span two values
fn combined_text(json: &Value) -> Vec<Vec<String>> {
    let text_paths = CORE_FIELDS
        .iter()
        .filter(|f| f.kind == FieldKind::Text)
        .map(|f| f.path)
        .chain(std::iter::once("properties.value"));

    text_paths
        .flat_map(|path| values_at(json, path))
        .filter_map(as_text)
        .map(|text| tokenize(&text))
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

/// Edit distance allowed for a token under "AUTO" fuzziness
fn auto_fuzziness(token: &str) -> usize {
    match token.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Start of a run in `haystack` matching `needle`, last token optionally as prefix
fn phrase_matches(haystack: &[String], needle: &[String], prefix_last: bool) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    let last = needle.len() - 1;
    haystack.windows(needle.len()).any(|window| {
        window.iter().zip(needle).enumerate().all(|(i, (have, want))| {
            if i == last && prefix_last {
                have.starts_with(want.as_str())
            } else {
                have == want
            }
        })
    })
}

/// Evaluation context: the document JSON and its combined text token runs
struct Ctx<'a> {
    json: &'a Value,
    all: &'a [Vec<String>],
}

impl<'a> Ctx<'a> {
    fn token_sets(&self, field: &str) -> Vec<Vec<String>> {
        if field == ALL_FIELD {
            return self.all.to_vec();
        }
        values_at(self.json, base_path(field))
            .into_iter()
            .filter_map(as_text)
            .map(|t| tokenize(&t))
            .collect()
    }
}

fn score(query: &Query, ctx: &Ctx<'_>) -> Option<f32> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::Term { field, value, boost } => {
            let hit = values_at(ctx.json, base_path(field))
                .into_iter()
                .any(|v| v == value);
            hit.then(|| boost.unwrap_or(1.0))
        },
        Query::Phrase { field, text, boost } | Query::PhrasePrefix { field, text, boost } => {
            let prefix = matches!(query, Query::PhrasePrefix { .. });
            let needle = tokenize(text);
            let hit = ctx
                .token_sets(field)
                .iter()
                .any(|tokens| phrase_matches(tokens, &needle, prefix));
            hit.then(|| boost.unwrap_or(1.0))
        },
        Query::Fuzzy { field, text, boost } => {
            let needle = tokenize(text);
            let sets = ctx.token_sets(field);
            let matched = needle
                .iter()
                .filter(|want| {
                    let allowed = auto_fuzziness(want);
                    sets.iter()
                        .flatten()
                        .any(|have| strsim::levenshtein(have, want) <= allowed)
                })
                .count();
            (matched > 0).then(|| boost.unwrap_or(1.0) * matched as f32)
        },
        Query::Match { field, text, boost } => {
            let needle = tokenize(text);
            let sets = ctx.token_sets(field);
            let matched = needle
                .iter()
                .filter(|want| sets.iter().flatten().any(|have| have == *want))
                .count();
            (matched > 0).then(|| boost.unwrap_or(1.0) * matched as f32)
        },
        Query::Bool(bool_query) => score_bool(bool_query, ctx),
        Query::Nested { path, query } => {
            let mut best: Option<f32> = None;
            for element in values_at(ctx.json, path) {
                let wrapper = wrap_at_path(path, element.clone());
                let inner = Ctx {
                    json: &wrapper,
                    all: ctx.all,
                };
                if let Some(s) = score(query, &inner) {
                    best = Some(best.map_or(s, |b| b.max(s)));
                }
            }
            best
        },
        Query::Range { field, gte, lte } => {
            let hit = values_at(ctx.json, base_path(field)).into_iter().any(|v| {
                gte.as_ref().map_or(true, |bound| compare(v, bound) != Some(Ordering::Less))
                    && lte.as_ref().map_or(true, |bound| compare(v, bound) != Some(Ordering::Greater))
                    && (gte.is_some() || lte.is_some())
            });
            hit.then_some(1.0)
        },
    }
}

fn score_bool(query: &BoolQuery, ctx: &Ctx<'_>) -> Option<f32> {
    let mut total = 0.0;
    for clause in &query.must {
        total += score(clause, ctx)?;
    }
    for clause in &query.filter {
        score(clause, ctx)?;
    }
    if query.must_not.iter().any(|clause| score(clause, ctx).is_some()) {
        return None;
    }
    let mut matched = 0;
    for clause in &query.should {
        if let Some(s) = score(clause, ctx) {
            matched += 1;
            total += s;
        }
    }
    (matched >= query.required_should()).then_some(total)
}

fn compare(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// `{"a": {"b": value}}` for path `a.b`
fn wrap_at_path(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, segment| {
        let mut map = serde_json::Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}

fn facet_for(aggregation: &Aggregation, matched: &[&StoredDoc]) -> Facet {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for doc in matched {
        let values: HashSet<String> = match aggregation {
            Aggregation::Field { field, .. } => values_at(&doc.json, base_path(field))
                .into_iter()
                .filter_map(as_text)
                .collect(),
            Aggregation::Property { key, .. } => doc
                .document
                .properties
                .iter()
                .filter(|p| &p.key == key)
                .map(|p| p.value.clone())
                .collect(),
        };
        for value in values {
            *counts.entry(value).or_default() += 1;
        }
    }

    let size = match aggregation {
        Aggregation::Field { size, .. } | Aggregation::Property { size, .. } => *size,
    };
    let mut buckets: Vec<FacetBucket> = counts
        .into_iter()
        .map(|(value, count)| FacetBucket { value, count })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    buckets.truncate(size);

    Facet {
        name: aggregation.name().to_string(),
        buckets,
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn ensure_index(&self) -> IndexResult<()> {
        Ok(())
    }

    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> IndexResult<BulkOutcome> {
        let mut docs = self.docs.write().await;
        for document in documents {
            let json = serde_json::to_value(document)?;
            let all = combined_text(&json);
            docs.insert(
                document.id.clone(),
                StoredDoc {
                    document: document.clone(),
                    json,
                    all,
                },
            );
        }
        Ok(BulkOutcome {
            indexed: documents.len(),
            failed: 0,
        })
    }

    async fn delete_by_list(&self, list_id: Uuid) -> IndexResult<u64> {
        let list_id = list_id.to_string();
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|_, d| d.document.species_list_id != list_id);
        Ok((before - docs.len()) as u64)
    }

    async fn delete_document(&self, record_id: Uuid) -> IndexResult<bool> {
        Ok(self.docs.write().await.remove(&record_id.to_string()).is_some())
    }

    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchHits> {
        request.check_window(self.max_result_window)?;

        let docs = self.docs.read().await;
        let mut scored: Vec<(f32, &StoredDoc)> = docs
            .values()
            .filter_map(|doc| {
                let ctx = Ctx {
                    json: &doc.json,
                    all: &doc.all,
                };
                score(&request.query, &ctx).map(|s| (s, doc))
            })
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });

        let total = scored.len() as u64;
        let matched: Vec<&StoredDoc> = scored.iter().map(|(_, d)| *d).collect();
        let facets = request
            .aggregations
            .iter()
            .map(|agg| facet_for(agg, &matched))
            .collect();

        if let Some(field) = &request.collapse {
            let mut seen = HashSet::new();
            scored.retain(|(_, doc)| {
                let key = values_at(&doc.json, base_path(field))
                    .first()
                    .and_then(|v| as_text(v))
                    .unwrap_or_default();
                seen.insert(key)
            });
        }

        let hits = scored
            .into_iter()
            .skip(request.from as usize)
            .take(request.size as usize)
            .map(|(score, doc)| Hit {
                score,
                document: doc.document.clone(),
            })
            .collect();

        Ok(SearchHits {
            total,
            hits,
            facets,
        })
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexError;
    use crate::models::{ListMetadata, ListRecord, ListType, Property, SpeciesList, TaxonColumn, TaxonFields};
    use serde_json::json;

    fn doc(list: &SpeciesList, name: &str, props: &[(&str, &str)]) -> IndexDocument {
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::ScientificName, name);
        let properties = props.iter().map(|(k, v)| Property::new(*k, *v)).collect();
        IndexDocument::project(list, &ListRecord::new(list.id, taxon, properties), None)
    }

    async fn fixture() -> (MemoryIndex, SpeciesList) {
        let index = MemoryIndex::new(100);
        let list = SpeciesList::new(ListMetadata::new("Canids of Australia", ListType::LocalList), "u1");
        index
            .bulk_upsert(&[
                doc(&list, "Vulpes vulpes", &[("status", "introduced")]),
                doc(&list, "Canis lupus dingo", &[("status", "native")]),
                doc(&list, "Canis familiaris", &[("status", "introduced")]),
            ])
            .await
            .unwrap();
        (index, list)
    }

    #[tokio::test]
    async fn test_phrase_prefix_on_all_field() {
        let (index, _) = fixture().await;
        let hits = index
            .search(&SearchRequest::new(Query::phrase_prefix("all", "canis lu")))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].document.taxon.scientific_name.as_deref(), Some("Canis lupus dingo"));

        // property values are part of the combined text
        let hits = index
            .search(&SearchRequest::new(Query::phrase_prefix("all", "nati")))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
    }

    #[tokio::test]
    async fn test_phrase_does_not_span_values() {
        let (index, _) = fixture().await;
        let hits = index
            .search(&SearchRequest::new(Query::phrase("all", "dingo native")))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);

        let hits = index
            .search(&SearchRequest::new(Query::phrase_prefix("all", "dingo nat")))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);

        let hits = index
            .search(&SearchRequest::new(Query::matches("all", "dingo native")))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
    }

    #[test]
    fn test_combined_text_keeps_values_apart() {
        let value = json!({
            "scientificName": "Canis lupus dingo",
            "properties": [{"key": "status", "value": "native"}]
        });
        let runs = combined_text(&value);
        assert!(runs.contains(&vec!["canis".to_string(), "lupus".to_string(), "dingo".to_string()]));
        assert!(runs.contains(&vec!["native".to_string()]));
    }

    #[tokio::test]
    async fn test_nested_property_match() {
        let (index, _) = fixture().await;
        let query = Query::nested(
            "properties",
            BoolQuery::new()
                .must(Query::term("properties.key", "status"))
                .must(Query::term("properties.value", "introduced"))
                .build(),
        );
        let hits = index.search(&SearchRequest::new(query)).await.unwrap();
        assert_eq!(hits.total, 2);
    }

    #[tokio::test]
    async fn test_term_on_keyword_subfield_and_fuzzy() {
        let (index, _) = fixture().await;
        let hits = index
            .search(&SearchRequest::new(Query::term("scientificName.keyword", "Vulpes vulpes")))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);

        let hits = index
            .search(&SearchRequest::new(Query::fuzzy("scientificName", "vulpis")))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
    }

    #[tokio::test]
    async fn test_facets_collapse_and_window() {
        let (index, list) = fixture().await;
        let mut request = SearchRequest::new(Query::MatchAll);
        request.aggregations.push(Aggregation::Property {
            key: "status".to_string(),
            size: 10,
        });
        let hits = index.search(&request).await.unwrap();
        assert_eq!(
            hits.facets[0].buckets,
            vec![
                FacetBucket { value: "introduced".to_string(), count: 2 },
                FacetBucket { value: "native".to_string(), count: 1 },
            ]
        );

        request.collapse = Some("speciesListID".to_string());
        let hits = index.search(&request).await.unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(hits.hits.len(), 1);
        assert_eq!(hits.hits[0].document.species_list_id, list.id.to_string());

        request.from = 100;
        request.size = 1;
        assert!(matches!(
            index.search(&request).await,
            Err(IndexError::ResultWindowExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_by_list() {
        let (index, list) = fixture().await;
        assert_eq!(index.delete_by_list(list.id).await.unwrap(), 3);
        assert!(index.is_empty().await);
    }

    #[test]
    fn test_range_and_wrap() {
        let value = json!({"n": 5});
        let ctx = Ctx { json: &value, all: &[] };
        let q = Query::Range {
            field: "n".to_string(),
            gte: Some(json!(1)),
            lte: Some(json!(5)),
        };
        assert!(score(&q, &ctx).is_some());

        assert_eq!(wrap_at_path("a.b", json!(1)), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_auto_fuzziness() {
        assert_eq!(auto_fuzziness("ab"), 0);
        assert_eq!(auto_fuzziness("abcde"), 1);
        assert_eq!(auto_fuzziness("abcdef"), 2);
    }
}
