//! Canonical domain models
//!
//! These are the records the canonical store persists. The search index holds
//! a denormalized projection of them (see [`crate::index::IndexDocument`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListType {
    SpeciesCharacters,
    ConservationList,
    SensitiveList,
    LocalList,
    CommonTrait,
    CommonHabitat,
    SpatialPortal,
    Profile,
    Test,
    #[default]
    Other,
}

impl ListType {
    pub const ALL: [ListType; 10] = [
        ListType::SpeciesCharacters,
        ListType::ConservationList,
        ListType::SensitiveList,
        ListType::LocalList,
        ListType::CommonTrait,
        ListType::CommonHabitat,
        ListType::SpatialPortal,
        ListType::Profile,
        ListType::Test,
        ListType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::SpeciesCharacters => "SPECIES_CHARACTERS",
            ListType::ConservationList => "CONSERVATION_LIST",
            ListType::SensitiveList => "SENSITIVE_LIST",
            ListType::LocalList => "LOCAL_LIST",
            ListType::CommonTrait => "COMMON_TRAIT",
            ListType::CommonHabitat => "COMMON_HABITAT",
            ListType::SpatialPortal => "SPATIAL_PORTAL",
            ListType::Profile => "PROFILE",
            ListType::Test => "TEST",
            ListType::Other => "OTHER",
        }
    }
}

impl FromStr for ListType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        ListType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("Unknown list type: {}", s))
    }
}

impl std::fmt::Display for ListType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive list attributes supplied by the list owner.
///
/// Releases keep a copy of this block as it was at release time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub list_type: ListType,
    pub licence: String,
    pub is_private: bool,
    pub is_authoritative: bool,
    pub is_threatened: bool,
    pub is_invasive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ListMetadata {
    pub fn new(title: impl Into<String>, list_type: ListType) -> Self {
        Self {
            title: title.into(),
            description: None,
            list_type,
            licence: "CC-BY".to_string(),
            is_private: false,
            is_authoritative: false,
            is_threatened: false,
            is_invasive: false,
            region: None,
            tags: Vec::new(),
        }
    }
}

/// A species list (checklist)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesList {
    pub id: Uuid,
    /// Optimistic concurrency token, bumped on every committed change
    pub version: i64,
    #[serde(flatten)]
    pub metadata: ListMetadata,
    pub owner: String,
    pub editors: Vec<String>,
    pub field_list: Vec<String>,
    pub facet_list: Vec<String>,
    pub row_count: i64,
    pub distinct_match_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpeciesList {
    pub fn new(metadata: ListMetadata, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version: 1,
            metadata,
            owner: owner.into(),
            editors: Vec::new(),
            field_list: Vec::new(),
            facet_list: Vec::new(),
            row_count: 0,
            distinct_match_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_private(&self) -> bool {
        self.metadata.is_private
    }

    /// Append keys not yet present, keeping the existing order
    pub fn merge_fields<'a>(&mut self, keys: impl IntoIterator<Item = &'a String>) {
        for key in keys {
            if !self.field_list.contains(key) {
                self.field_list.push(key.clone());
            }
        }
    }
}

/// Reserved taxonomic columns held out of the property bag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonColumn {
    ScientificName,
    TaxonId,
    TaxonConceptId,
    VernacularName,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
}

impl TaxonColumn {
    /// Column order used for release exports
    pub const ALL: [TaxonColumn; 10] = [
        TaxonColumn::ScientificName,
        TaxonColumn::VernacularName,
        TaxonColumn::TaxonId,
        TaxonColumn::TaxonConceptId,
        TaxonColumn::Kingdom,
        TaxonColumn::Phylum,
        TaxonColumn::Class,
        TaxonColumn::Order,
        TaxonColumn::Family,
        TaxonColumn::Genus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonColumn::ScientificName => "scientificName",
            TaxonColumn::TaxonId => "taxonID",
            TaxonColumn::TaxonConceptId => "taxonConceptID",
            TaxonColumn::VernacularName => "vernacularName",
            TaxonColumn::Kingdom => "kingdom",
            TaxonColumn::Phylum => "phylum",
            TaxonColumn::Class => "class",
            TaxonColumn::Order => "order",
            TaxonColumn::Family => "family",
            TaxonColumn::Genus => "genus",
        }
    }
}

/// Taxonomic fields as supplied in the checklist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(rename = "taxonID", skip_serializing_if = "Option::is_none")]
    pub taxon_id: Option<String>,
    #[serde(rename = "taxonConceptID", skip_serializing_if = "Option::is_none")]
    pub taxon_concept_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vernacular_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
}

impl TaxonFields {
    pub fn get(&self, column: TaxonColumn) -> Option<&str> {
        let value = match column {
            TaxonColumn::ScientificName => &self.scientific_name,
            TaxonColumn::TaxonId => &self.taxon_id,
            TaxonColumn::TaxonConceptId => &self.taxon_concept_id,
            TaxonColumn::VernacularName => &self.vernacular_name,
            TaxonColumn::Kingdom => &self.kingdom,
            TaxonColumn::Phylum => &self.phylum,
            TaxonColumn::Class => &self.class,
            TaxonColumn::Order => &self.order,
            TaxonColumn::Family => &self.family,
            TaxonColumn::Genus => &self.genus,
        };
        value.as_deref()
    }

    /// Set a column; blank values clear it
    pub fn set(&mut self, column: TaxonColumn, value: impl Into<String>) {
        let value = value.into();
        let value = (!value.trim().is_empty()).then(|| value.trim().to_string());
        let slot = match column {
            TaxonColumn::ScientificName => &mut self.scientific_name,
            TaxonColumn::TaxonId => &mut self.taxon_id,
            TaxonColumn::TaxonConceptId => &mut self.taxon_concept_id,
            TaxonColumn::VernacularName => &mut self.vernacular_name,
            TaxonColumn::Kingdom => &mut self.kingdom,
            TaxonColumn::Phylum => &mut self.phylum,
            TaxonColumn::Class => &mut self.class,
            TaxonColumn::Order => &mut self.order,
            TaxonColumn::Family => &mut self.family,
            TaxonColumn::Genus => &mut self.genus,
        };
        *slot = value;
    }

    /// True when none of scientificName, taxonID or taxonConceptID is populated
    pub fn lacks_identifier(&self) -> bool {
        self.scientific_name.is_none() && self.taxon_id.is_none() && self.taxon_concept_id.is_none()
    }
}

/// One entry of a record's property bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Resolved taxonomic assignment returned by the name matching service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name_authorship: Option<String>,
    #[serde(rename = "taxonConceptID", skip_serializing_if = "Option::is_none")]
    pub taxon_concept_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(rename = "rankID", skip_serializing_if = "Option::is_none")]
    pub rank_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(rename = "kingdomID", skip_serializing_if = "Option::is_none")]
    pub kingdom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(rename = "phylumID", skip_serializing_if = "Option::is_none")]
    pub phylum_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(rename = "classID", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(rename = "orderID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(rename = "familyID", skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(rename = "genusID", skip_serializing_if = "Option::is_none")]
    pub genus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vernacular_name: Option<String>,
    #[serde(default)]
    pub species_group: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Classification {
    /// A non-success result carrying the resolver's issue codes
    pub fn unmatched(issues: Vec<String>) -> Self {
        Self {
            success: false,
            issues,
            ..Default::default()
        }
    }

    /// Taxon concept id of a successful match
    pub fn matched_concept(&self) -> Option<&str> {
        if self.success {
            self.taxon_concept_id.as_deref()
        } else {
            None
        }
    }
}

/// One checklist row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecord {
    pub id: Uuid,
    #[serde(rename = "speciesListID")]
    pub list_id: Uuid,
    #[serde(flatten)]
    pub taxon: TaxonFields,
    pub properties: Vec<Property>,
    pub classification: Option<Classification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListRecord {
    pub fn new(list_id: Uuid, taxon: TaxonFields, properties: Vec<Property>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            list_id,
            taxon,
            properties,
            classification: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

/// Immutable versioned CSV snapshot of a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: Uuid,
    #[serde(rename = "speciesListID")]
    pub list_id: Uuid,
    /// List version at the time of release
    pub released_version: i64,
    /// Artifact location as reported by the artifact store
    pub location: String,
    pub metadata: ListMetadata,
    pub row_count: i64,
    pub checksum: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_type_parse() {
        assert_eq!("conservation_list".parse::<ListType>().unwrap(), ListType::ConservationList);
        assert_eq!("Local List".parse::<ListType>().unwrap(), ListType::LocalList);
        assert!("WISHLIST".parse::<ListType>().is_err());
    }

    #[test]
    fn test_taxon_fields_set_trims_and_clears() {
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::Kingdom, "  Plantae ");
        assert_eq!(taxon.get(TaxonColumn::Kingdom), Some("Plantae"));

        taxon.set(TaxonColumn::Kingdom, "   ");
        assert_eq!(taxon.get(TaxonColumn::Kingdom), None);
        assert!(taxon.lacks_identifier());

        taxon.set(TaxonColumn::TaxonConceptId, "urn:lsid:123");
        assert!(!taxon.lacks_identifier());
    }

    #[test]
    fn test_merge_fields_keeps_order() {
        let mut list = SpeciesList::new(ListMetadata::new("Birds", ListType::LocalList), "u1");
        list.field_list = vec!["status".to_string()];
        let incoming = vec!["habitat".to_string(), "status".to_string()];
        list.merge_fields(&incoming);
        assert_eq!(list.field_list, vec!["status", "habitat"]);
    }

    #[test]
    fn test_record_json_uses_darwin_core_names() {
        let mut taxon = TaxonFields::default();
        taxon.set(TaxonColumn::TaxonId, "T1");
        let record = ListRecord::new(Uuid::new_v4(), taxon, vec![Property::new("note", "x")]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["taxonID"], "T1");
        assert!(json.get("speciesListID").is_some());
        assert_eq!(record.property("note"), Some("x"));
    }
}
