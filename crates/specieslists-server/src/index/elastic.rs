//! Elasticsearch-compatible index adapter
//!
//! Renders the query AST to query DSL and speaks the plain REST API through
//! reqwest, so any Elasticsearch 7+/OpenSearch cluster works.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::document::{FieldKind, ALL_FIELD, CORE_FIELDS, PROPERTIES_PATH};
use super::{
    Aggregation, BulkOutcome, Facet, FacetBucket, Hit, IndexDocument, IndexError, IndexResult,
    SearchHits, SearchIndex, SearchRequest,
};
use crate::config::SearchConfig;
use crate::search::query::{BoolQuery, Query};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
    credentials: Option<(String, Option<String>)>,
    max_result_window: u64,
}

impl ElasticIndex {
    pub fn new(config: &SearchConfig) -> IndexResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            max_result_window: config.max_result_window,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}{}", self.base_url, self.index, path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }
}

async fn check(response: Response) -> IndexResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IndexError::Engine {
        status: status.as_u16(),
        body,
    })
}

fn with_boost(mut body: Map<String, Value>, boost: Option<f32>) -> Value {
    if let Some(boost) = boost {
        body.insert("boost".to_string(), json!(boost));
    }
    Value::Object(body)
}

fn text_clause(kind: &str, field: &str, text: &str, boost: Option<f32>, fuzzy: bool) -> Value {
    let mut body = Map::new();
    body.insert("query".to_string(), json!(text));
    if fuzzy {
        body.insert("fuzziness".to_string(), json!("AUTO"));
    }
    json!({ kind: { field: with_boost(body, boost) } })
}

fn render_bool(query: &BoolQuery) -> Value {
    let mut body = Map::new();
    for (name, clauses) in [
        ("must", &query.must),
        ("should", &query.should),
        ("filter", &query.filter),
        ("must_not", &query.must_not),
    ] {
        if !clauses.is_empty() {
            body.insert(
                name.to_string(),
                Value::Array(clauses.iter().map(render_query).collect()),
            );
        }
    }
    if let Some(n) = query.minimum_should_match {
        body.insert("minimum_should_match".to_string(), json!(n));
    }
    json!({ "bool": body })
}

/// Query DSL for a query
pub fn render_query(query: &Query) -> Value {
    match query {
        Query::MatchAll => json!({ "match_all": {} }),
        Query::Term { field, value, boost } => {
            let mut body = Map::new();
            body.insert("value".to_string(), value.clone());
            json!({ "term": { field: with_boost(body, *boost) } })
        },
        Query::Phrase { field, text, boost } => text_clause("match_phrase", field, text, *boost, false),
        Query::PhrasePrefix { field, text, boost } => {
            text_clause("match_phrase_prefix", field, text, *boost, false)
        },
        Query::Fuzzy { field, text, boost } => text_clause("match", field, text, *boost, true),
        Query::Match { field, text, boost } => text_clause("match", field, text, *boost, false),
        Query::Bool(bool_query) => render_bool(bool_query),
        Query::Nested { path, query } => json!({
            "nested": { "path": path, "query": render_query(query) }
        }),
        Query::Range { field, gte, lte } => {
            let mut body = Map::new();
            if let Some(gte) = gte {
                body.insert("gte".to_string(), gte.clone());
            }
            if let Some(lte) = lte {
                body.insert("lte".to_string(), lte.clone());
            }
            json!({ "range": { field: body } })
        },
    }
}

fn aggregation_key(position: usize) -> String {
    format!("agg_{position}")
}

fn render_aggregation(aggregation: &Aggregation) -> Value {
    match aggregation {
        Aggregation::Field { field, size, .. } => json!({
            "terms": { "field": field, "size": size }
        }),
        Aggregation::Property { key, size } => json!({
            "nested": { "path": PROPERTIES_PATH },
            "aggs": {
                "filtered": {
                    "filter": { "term": { "properties.key": key } },
                    "aggs": {
                        "values": {
                            "terms": { "field": "properties.value", "size": size },
                            "aggs": { "records": { "reverse_nested": {} } }
                        }
                    }
                }
            }
        }),
    }
}

/// Full `_search` body for a request
pub fn render_search(request: &SearchRequest) -> Value {
    let mut body = json!({
        "query": render_query(&request.query),
        "from": request.from,
        "size": request.size,
        "track_total_hits": true,
        "track_scores": true,
        "sort": [{ "_score": "desc" }, { "id": "asc" }],
    });
    if let Some(field) = &request.collapse {
        body["collapse"] = json!({ "field": field });
    }
    if !request.aggregations.is_empty() {
        let aggs: Map<String, Value> = request
            .aggregations
            .iter()
            .enumerate()
            .map(|(i, agg)| (aggregation_key(i), render_aggregation(agg)))
            .collect();
        body["aggs"] = Value::Object(aggs);
    }
    body
}

fn field_mapping(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Text => json!({
            "type": "text",
            "copy_to": ALL_FIELD,
            "fields": {
                "keyword": { "type": "keyword", "ignore_above": 256 },
                "search": { "type": "search_as_you_type" }
            }
        }),
        FieldKind::Keyword => json!({ "type": "keyword" }),
        FieldKind::Boolean => json!({ "type": "boolean" }),
    }
}

fn insert_path(properties: &mut Map<String, Value>, path: &str, mapping: Value) {
    match path.split_once('.') {
        None => {
            properties.insert(path.to_string(), mapping);
        },
        Some((head, rest)) => {
            let object = properties
                .entry(head.to_string())
                .or_insert_with(|| json!({ "properties": {} }));
            if let Some(inner) = object.get_mut("properties").and_then(Value::as_object_mut) {
                insert_path(inner, rest, mapping);
            }
        },
    }
}

/// Index settings and mapping derived from the core field table
pub fn index_definition(max_result_window: u64) -> Value {
    let mut properties = Map::new();
    properties.insert("id".to_string(), json!({ "type": "keyword" }));
    properties.insert(ALL_FIELD.to_string(), json!({ "type": "text" }));
    properties.insert("dateCreated".to_string(), json!({ "type": "date" }));
    properties.insert("lastUpdated".to_string(), json!({ "type": "date" }));
    for field in CORE_FIELDS {
        insert_path(&mut properties, field.path, field_mapping(field.kind));
    }
    properties.insert(
        PROPERTIES_PATH.to_string(),
        json!({
            "type": "nested",
            "properties": {
                "key": { "type": "keyword" },
                "value": {
                    "type": "keyword",
                    "copy_to": ALL_FIELD,
                    "fields": { "search": { "type": "search_as_you_type" } }
                }
            }
        }),
    );

    json!({
        "settings": { "index": { "max_result_window": max_result_window } },
        "mappings": { "properties": properties }
    })
}

fn bucket_value(bucket: &Value) -> Option<String> {
    if let Some(text) = bucket.get("key_as_string").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    match bucket.get("key")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_facet(aggregation: &Aggregation, body: &Value) -> IndexResult<Facet> {
    let (buckets, nested) = match aggregation {
        Aggregation::Field { .. } => (body.get("buckets"), false),
        Aggregation::Property { .. } => (body.pointer("/filtered/values/buckets"), true),
    };
    let buckets = buckets
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::Response(format!("missing buckets for {}", aggregation.name())))?;

    let buckets = buckets
        .iter()
        .filter_map(|bucket| {
            let count = if nested {
                bucket.pointer("/records/doc_count")
            } else {
                bucket.get("doc_count")
            };
            Some(FacetBucket {
                value: bucket_value(bucket)?,
                count: count.and_then(Value::as_u64).unwrap_or(0),
            })
        })
        .collect();

    Ok(Facet {
        name: aggregation.name().to_string(),
        buckets,
    })
}

fn parse_search(request: &SearchRequest, body: &Value) -> IndexResult<SearchHits> {
    let total = body
        .pointer("/hits/total/value")
        .or_else(|| body.pointer("/hits/total"))
        .and_then(Value::as_u64)
        .ok_or_else(|| IndexError::Response("missing hits.total".to_string()))?;

    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|hit| {
            let source = hit
                .get("_source")
                .cloned()
                .ok_or_else(|| IndexError::Response("hit without _source".to_string()))?;
            Ok(Hit {
                score: hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                document: serde_json::from_value(source)?,
            })
        })
        .collect::<IndexResult<Vec<_>>>()?;

    let facets = request
        .aggregations
        .iter()
        .enumerate()
        .map(|(i, agg)| {
            let agg_body = body
                .pointer(&format!("/aggregations/{}", aggregation_key(i)))
                .ok_or_else(|| IndexError::Response(format!("missing aggregation {}", agg.name())))?;
            parse_facet(agg, agg_body)
        })
        .collect::<IndexResult<Vec<_>>>()?;

    Ok(SearchHits { total, hits, facets })
}

fn bulk_body(index: &str, documents: &[IndexDocument]) -> IndexResult<String> {
    let mut body = String::new();
    for document in documents {
        let action = json!({ "index": { "_index": index, "_id": document.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    #[instrument(skip(self), fields(index = %self.index))]
    async fn ensure_index(&self) -> IndexResult<()> {
        let response = self.request(Method::HEAD, "").send().await?;
        if response.status() != StatusCode::NOT_FOUND {
            check(response).await?;
            debug!("Index exists");
            return Ok(());
        }

        let response = self
            .request(Method::PUT, "")
            .json(&index_definition(self.max_result_window))
            .send()
            .await?;
        check(response).await?;
        info!("Created search index");
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn bulk_upsert(&self, documents: &[IndexDocument]) -> IndexResult<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let body = bulk_body(&self.index, documents)?;
        let response = self
            .request(Method::POST, "/_bulk?refresh=wait_for")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;

        let failed = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.pointer("/index/error").is_some())
                    .count()
            })
            .unwrap_or(0);
        if failed > 0 {
            warn!(failed, "Bulk request had item failures");
        }

        Ok(BulkOutcome {
            indexed: documents.len() - failed,
            failed,
        })
    }

    #[instrument(skip(self))]
    async fn delete_by_list(&self, list_id: Uuid) -> IndexResult<u64> {
        let query = Query::term("speciesListID", list_id.to_string());
        let response = self
            .request(Method::POST, "/_delete_by_query?refresh=true&conflicts=proceed")
            .json(&json!({ "query": render_query(&query) }))
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        Ok(body.get("deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, record_id: Uuid) -> IndexResult<bool> {
        let response = self
            .request(Method::DELETE, &format!("/_doc/{record_id}?refresh=wait_for"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    #[instrument(skip(self, request), fields(from = request.from, size = request.size))]
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchHits> {
        request.check_window(self.max_result_window)?;

        let response = self
            .request(Method::POST, "/_search")
            .json(&render_search(request))
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;
        parse_search(request, &body)
    }

    fn max_result_window(&self) -> u64 {
        self.max_result_window
    }
}
