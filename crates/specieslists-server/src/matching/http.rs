//! HTTP name matching client
//!
//! Talks to an ALA-style namematching service:
//! `GET {base}/api/searchByClassification?scientificName=...&kingdom=...`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{NameQuery, NameResolver, ResolveError};
use crate::models::Classification;

pub const SEARCH_BY_CLASSIFICATION_PATH: &str = "/api/searchByClassification";

/// Wire format of the namematching service. Note the `classs` spelling.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameSearchResult {
    #[serde(default)]
    success: bool,
    scientific_name: Option<String>,
    scientific_name_authorship: Option<String>,
    #[serde(rename = "taxonConceptID")]
    taxon_concept_id: Option<String>,
    rank: Option<String>,
    #[serde(rename = "rankID")]
    rank_id: Option<i32>,
    match_type: Option<String>,
    kingdom: Option<String>,
    #[serde(rename = "kingdomID")]
    kingdom_id: Option<String>,
    phylum: Option<String>,
    #[serde(rename = "phylumID")]
    phylum_id: Option<String>,
    classs: Option<String>,
    #[serde(rename = "classID")]
    class_id: Option<String>,
    order: Option<String>,
    #[serde(rename = "orderID")]
    order_id: Option<String>,
    family: Option<String>,
    #[serde(rename = "familyID")]
    family_id: Option<String>,
    genus: Option<String>,
    #[serde(rename = "genusID")]
    genus_id: Option<String>,
    vernacular_name: Option<String>,
    #[serde(default)]
    species_group: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
}

impl From<NameSearchResult> for Classification {
    fn from(result: NameSearchResult) -> Self {
        if !result.success {
            return Classification::unmatched(result.issues);
        }
        Classification {
            success: true,
            scientific_name: result.scientific_name,
            scientific_name_authorship: result.scientific_name_authorship,
            taxon_concept_id: result.taxon_concept_id,
            rank: result.rank,
            rank_id: result.rank_id,
            match_type: result.match_type,
            kingdom: result.kingdom,
            kingdom_id: result.kingdom_id,
            phylum: result.phylum,
            phylum_id: result.phylum_id,
            class: result.classs,
            class_id: result.class_id,
            order: result.order,
            order_id: result.order_id,
            family: result.family,
            family_id: result.family_id,
            genus: result.genus,
            genus_id: result.genus_id,
            vernacular_name: result.vernacular_name,
            species_group: result.species_group,
            issues: result.issues,
        }
    }
}

pub struct HttpNameResolver {
    client: Client,
    base_url: String,
}

impl HttpNameResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NameResolver for HttpNameResolver {
    #[instrument(skip(self, query), fields(name = %query.scientific_name))]
    async fn resolve(&self, query: &NameQuery) -> Result<Classification, ResolveError> {
        let url = format!("{}{}", self.base_url, SEARCH_BY_CLASSIFICATION_PATH);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let result: NameSearchResult =
            serde_json::from_slice(&body).map_err(|e| ResolveError::Decode(e.to_string()))?;

        debug!(success = result.success, match_type = ?result.match_type, "Name resolved");
        Ok(result.into())
    }
}
