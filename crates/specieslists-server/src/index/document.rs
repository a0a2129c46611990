//! Denormalized search documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Classification, ListRecord, ListType, Property, SpeciesList, TaxonFields};

/// How a core field is mapped in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Analyzed text with `.keyword` (exact) and `.search` (prefix) sub-fields
    Text,
    /// Exact values only
    Keyword,
    Boolean,
}

/// A filterable field with a fixed place in every document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreField {
    /// Name callers use in filters and field restrictions
    pub name: &'static str,
    /// Dotted path inside the document
    pub path: &'static str,
    pub kind: FieldKind,
}

impl CoreField {
    /// Path holding exact values, for term filters and aggregations
    pub fn exact_path(&self) -> String {
        match self.kind {
            FieldKind::Text => format!("{}.keyword", self.path),
            FieldKind::Keyword | FieldKind::Boolean => self.path.to_string(),
        }
    }

    /// Path used for free-text matching; booleans have none
    pub fn search_path(&self) -> Option<String> {
        match self.kind {
            FieldKind::Text => Some(format!("{}.search", self.path)),
            FieldKind::Keyword => Some(self.path.to_string()),
            FieldKind::Boolean => None,
        }
    }

    pub fn lookup(name: &str) -> Option<&'static CoreField> {
        CORE_FIELDS.iter().find(|f| f.name == name)
    }
}

const fn field(name: &'static str, path: &'static str, kind: FieldKind) -> CoreField {
    CoreField { name, path, kind }
}

/// The fixed document schema. Anything else is a property.
pub const CORE_FIELDS: &[CoreField] = &[
    field("speciesListID", "speciesListID", FieldKind::Keyword),
    field("speciesListName", "speciesListName", FieldKind::Text),
    field("listType", "listType", FieldKind::Keyword),
    field("licence", "licence", FieldKind::Keyword),
    field("isPrivate", "isPrivate", FieldKind::Boolean),
    field("isAuthoritative", "isAuthoritative", FieldKind::Boolean),
    field("isThreatened", "isThreatened", FieldKind::Boolean),
    field("isInvasive", "isInvasive", FieldKind::Boolean),
    field("hasRegion", "hasRegion", FieldKind::Boolean),
    field("region", "region", FieldKind::Text),
    field("owner", "owner", FieldKind::Keyword),
    field("editors", "editors", FieldKind::Keyword),
    field("tags", "tags", FieldKind::Keyword),
    field("scientificName", "scientificName", FieldKind::Text),
    field("vernacularName", "vernacularName", FieldKind::Text),
    field("taxonID", "taxonID", FieldKind::Keyword),
    field("taxonConceptID", "taxonConceptID", FieldKind::Keyword),
    field("kingdom", "kingdom", FieldKind::Text),
    field("phylum", "phylum", FieldKind::Text),
    field("class", "class", FieldKind::Text),
    field("order", "order", FieldKind::Text),
    field("family", "family", FieldKind::Text),
    field("genus", "genus", FieldKind::Text),
    field("matched", "classification.success", FieldKind::Boolean),
    field("matchedName", "classification.scientificName", FieldKind::Text),
    field("matchedConceptID", "classification.taxonConceptID", FieldKind::Keyword),
    field("rank", "classification.rank", FieldKind::Keyword),
    field("matchType", "classification.matchType", FieldKind::Keyword),
    field("speciesGroup", "classification.speciesGroup", FieldKind::Keyword),
    field("classification.kingdom", "classification.kingdom", FieldKind::Text),
    field("classification.phylum", "classification.phylum", FieldKind::Text),
    field("classification.class", "classification.class", FieldKind::Text),
    field("classification.order", "classification.order", FieldKind::Text),
    field("classification.family", "classification.family", FieldKind::Text),
    field("classification.genus", "classification.genus", FieldKind::Text),
    field("classification.vernacularName", "classification.vernacularName", FieldKind::Text),
];

/// Name of the combined free-text field
pub const ALL_FIELD: &str = "all";

/// Path of the nested property pairs
pub const PROPERTIES_PATH: &str = "properties";

/// One record as the search engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub id: String,
    #[serde(rename = "speciesListID")]
    pub species_list_id: String,
    pub species_list_name: String,
    pub list_type: ListType,
    pub licence: String,
    pub is_private: bool,
    pub is_authoritative: bool,
    pub is_threatened: bool,
    pub is_invasive: bool,
    pub has_region: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub owner: String,
    pub editors: Vec<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub taxon: TaxonFields,
    pub properties: Vec<Property>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl IndexDocument {
    /// Project a record, its list and its classification into one document
    pub fn project(list: &SpeciesList, record: &ListRecord, classification: Option<&Classification>) -> Self {
        let metadata = &list.metadata;
        Self {
            id: record.id.to_string(),
            species_list_id: list.id.to_string(),
            species_list_name: metadata.title.clone(),
            list_type: metadata.list_type,
            licence: metadata.licence.clone(),
            is_private: metadata.is_private,
            is_authoritative: metadata.is_authoritative,
            is_threatened: metadata.is_threatened,
            is_invasive: metadata.is_invasive,
            has_region: metadata.region.as_deref().is_some_and(|r| !r.trim().is_empty()),
            region: metadata.region.clone(),
            owner: list.owner.clone(),
            editors: list.editors.clone(),
            tags: metadata.tags.clone(),
            taxon: record.taxon.clone(),
            properties: record.properties.clone(),
            classification: classification.cloned(),
            date_created: record.created_at,
            last_updated: record.updated_at,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListMetadata, TaxonColumn};

    fn list() -> SpeciesList {
        let mut metadata = ListMetadata::new("NSW weeds", ListType::SensitiveList);
        metadata.is_invasive = true;
        metadata.region = Some("New South Wales".to_string());
        metadata.tags = vec!["weeds".to_string()];
        let mut list = SpeciesList::new(metadata, "owner-1");
        list.editors = vec!["editor-1".to_string()];
        list
    }

    #[test]
    fn test_project_copies_list_attributes() {
        let list = list();
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::ScientificName, "Lantana camara");
        let record = ListRecord::new(list.id, taxon, vec![Property::new("status", "declared")]);
        let classification = Classification {
            success: true,
            taxon_concept_id: Some("urn:lantana".to_string()),
            ..Default::default()
        };

        let doc = IndexDocument::project(&list, &record, Some(&classification));
        assert_eq!(doc.id, record.id.to_string());
        assert_eq!(doc.species_list_id, list.id.to_string());
        assert_eq!(doc.species_list_name, "NSW weeds");
        assert!(doc.is_invasive && doc.has_region && !doc.is_private);
        assert_eq!(doc.property("status"), Some("declared"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["speciesListID"], list.id.to_string());
        assert_eq!(json["scientificName"], "Lantana camara");
        assert_eq!(json["classification"]["success"], true);
        assert_eq!(json["listType"], "SENSITIVE_LIST");
    }

    #[test]
    fn test_core_field_paths() {
        let name = CoreField::lookup("scientificName").unwrap();
        assert_eq!(name.exact_path(), "scientificName.keyword");
        assert_eq!(name.search_path().as_deref(), Some("scientificName.search"));

        let private = CoreField::lookup("isPrivate").unwrap();
        assert_eq!(private.exact_path(), "isPrivate");
        assert_eq!(private.search_path(), None);

        assert!(CoreField::lookup("note").is_none());
    }
}
