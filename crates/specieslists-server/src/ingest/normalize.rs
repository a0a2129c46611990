//! Header and property key normalization
//!
//! Uploaded checklists use whatever column names their authors liked. Reserved
//! taxonomic columns are recognised regardless of case or separators; the
//! remaining columns become property keys, cleaned to a safe character set and
//! mapped onto Darwin Core term names where one matches.

use regex::Regex;

use crate::models::TaxonColumn;

/// Darwin Core (and common ALA list) terms that property keys map onto
pub const DARWIN_CORE_TERMS: &[&str] = &[
    "acceptedNameUsage",
    "acceptedNameUsageID",
    "authority",
    "category",
    "continent",
    "country",
    "countryCode",
    "county",
    "datasetName",
    "decimalLatitude",
    "decimalLongitude",
    "degreeOfEstablishment",
    "establishmentMeans",
    "eventDate",
    "habitat",
    "infraspecificEpithet",
    "institutionCode",
    "island",
    "islandGroup",
    "license",
    "locality",
    "locationID",
    "municipality",
    "nameAccordingTo",
    "nomenclaturalCode",
    "nomenclaturalStatus",
    "occurrenceRemarks",
    "occurrenceStatus",
    "originalNameUsage",
    "pathway",
    "recordedBy",
    "references",
    "rightsHolder",
    "scientificNameAuthorship",
    "source",
    "sourceStatus",
    "specificEpithet",
    "stateProvince",
    "status",
    "subgenus",
    "taxonRank",
    "taxonRemarks",
    "taxonomicStatus",
    "threatStatus",
    "verbatimScientificName",
    "waterBody",
];

/// What an uploaded column is used for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Taxon(TaxonColumn),
    /// "Supplied Name" overrides scientificName when present
    SuppliedName,
    Property(String),
}

/// A header together with its role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    pub original: String,
    pub role: ColumnRole,
}

/// Cleans property keys.
///
/// Holds the compiled patterns; build one per loader and share it.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    invalid: Regex,
    whitespace: Regex,
    underscores: Regex,
}

impl FieldNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            invalid: Regex::new(r"[^\w\s\-+^:,]")?,
            whitespace: Regex::new(r"\s+")?,
            underscores: Regex::new(r"_{2,}")?,
        })
    }

    /// Strip disallowed characters, turn whitespace runs into underscores and
    /// collapse repeated underscores. May return an empty string.
    pub fn clean_key(&self, raw: &str) -> String {
        let stripped = self.invalid.replace_all(raw.trim(), "");
        let spaced = self.whitespace.replace_all(stripped.trim(), "_");
        self.underscores.replace_all(&spaced, "_").into_owned()
    }

    /// Clean a key and map it onto a vocabulary term when one matches
    pub fn normalize_key(&self, raw: &str) -> Option<String> {
        let cleaned = self.clean_key(raw);
        if cleaned.is_empty() {
            return None;
        }
        Some(
            canonical_term(&cleaned)
                .map(str::to_string)
                .unwrap_or(cleaned),
        )
    }

    /// Decide the role of every header, in column order.
    ///
    /// Headers that clean to nothing get a positional `field_N` key so their
    /// values are not lost.
    pub fn plan(&self, headers: &[String]) -> Vec<ColumnPlan> {
        headers
            .iter()
            .enumerate()
            .map(|(position, header)| {
                let role = reserved_column(header).unwrap_or_else(|| {
                    ColumnRole::Property(
                        self.normalize_key(header)
                            .unwrap_or_else(|| format!("field_{}", position + 1)),
                    )
                });
                ColumnPlan {
                    original: header.clone(),
                    role,
                }
            })
            .collect()
    }
}

/// Lowercased alphanumerics only, for separator-insensitive comparison
fn compact(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Reserved role of a raw header, if any
pub fn reserved_column(header: &str) -> Option<ColumnRole> {
    let column = match compact(header).as_str() {
        "scientificname" => TaxonColumn::ScientificName,
        "taxonid" => TaxonColumn::TaxonId,
        "taxonconceptid" => TaxonColumn::TaxonConceptId,
        "vernacularname" | "commonname" => TaxonColumn::VernacularName,
        "kingdom" => TaxonColumn::Kingdom,
        "phylum" => TaxonColumn::Phylum,
        "class" => TaxonColumn::Class,
        "order" => TaxonColumn::Order,
        "family" => TaxonColumn::Family,
        "genus" => TaxonColumn::Genus,
        "suppliedname" => return Some(ColumnRole::SuppliedName),
        _ => return None,
    };
    Some(ColumnRole::Taxon(column))
}

/// Vocabulary term matching a cleaned key, ignoring case and separators
pub fn canonical_term(key: &str) -> Option<&'static str> {
    let wanted = compact(key);
    DARWIN_CORE_TERMS
        .iter()
        .copied()
        .find(|term| term.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new().unwrap()
    }

    #[test]
    fn test_clean_key() {
        let n = normalizer();
        assert_eq!(n.clean_key("  Host plant (primary) "), "Host_plant_primary");
        assert_eq!(n.clean_key("a__b   c"), "a_b_c");
        assert_eq!(n.clean_key("IUCN: category, 2024+"), "IUCN:_category,_2024+");
        assert_eq!(n.clean_key("%%%"), "");
    }

    #[test]
    fn test_vocabulary_mapping() {
        let n = normalizer();
        assert_eq!(n.normalize_key("State / Province").as_deref(), Some("stateProvince"));
        assert_eq!(n.normalize_key("establishment_means").as_deref(), Some("establishmentMeans"));
        assert_eq!(n.normalize_key("STATUS").as_deref(), Some("status"));
        assert_eq!(n.normalize_key("Host plant").as_deref(), Some("Host_plant"));
        assert_eq!(n.normalize_key("()"), None);
    }

    #[test]
    fn test_reserved_columns_are_separator_insensitive() {
        for header in ["scientificName", "Scientific Name", "scientific_name", "SCIENTIFIC-NAME"] {
            assert_eq!(
                reserved_column(header),
                Some(ColumnRole::Taxon(TaxonColumn::ScientificName)),
                "{header}"
            );
        }
        assert_eq!(reserved_column("Supplied Name"), Some(ColumnRole::SuppliedName));
        assert_eq!(reserved_column("taxonConceptID"), Some(ColumnRole::Taxon(TaxonColumn::TaxonConceptId)));
        assert_eq!(reserved_column("note"), None);
    }

    #[test]
    fn test_plan_assigns_roles_in_order() {
        let headers: Vec<String> = ["scientificName", "kingdom", "note", "???"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = normalizer().plan(&headers);
        assert_eq!(plan[0].role, ColumnRole::Taxon(TaxonColumn::ScientificName));
        assert_eq!(plan[1].role, ColumnRole::Taxon(TaxonColumn::Kingdom));
        assert_eq!(plan[2].role, ColumnRole::Property("note".to_string()));
        assert_eq!(plan[3].role, ColumnRole::Property("field_4".to_string()));
        assert_eq!(plan[3].original, "???");
    }

    proptest! {
        #[test]
        fn prop_cleaned_keys_use_safe_characters(raw in "\\PC{0,40}") {
            let cleaned = normalizer().clean_key(&raw);
            prop_assert!(!cleaned.chars().any(char::is_whitespace));
            prop_assert!(cleaned
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || "-+^:,".contains(c) || is_word_mark(c)));
            prop_assert!(!cleaned.contains("__"));
        }
    }

    /// `\w` also admits combining marks and connector punctuation
    fn is_word_mark(c: char) -> bool {
        Regex::new(r"^\w$").map(|r| r.is_match(&c.to_string())).unwrap_or(false)
    }
}
