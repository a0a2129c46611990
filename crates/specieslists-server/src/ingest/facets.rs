//! Facet eligibility tracking
//!
//! A property is offered as a facet only when it has few distinct values and
//! all of them are short. Once a field breaks either limit during a run it is
//! excluded for the rest of that run and its value set is dropped.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct FieldStats {
    distinct: HashSet<String>,
    max_len: usize,
    excluded: bool,
}

#[derive(Debug)]
pub struct FacetTracker {
    max_distinct: usize,
    max_value_length: usize,
    fields: HashMap<String, FieldStats>,
}

impl FacetTracker {
    pub fn new(max_distinct: usize, max_value_length: usize) -> Self {
        Self {
            max_distinct,
            max_value_length,
            fields: HashMap::new(),
        }
    }

    /// Record one non-blank value of a field
    pub fn observe(&mut self, key: &str, value: &str) {
        let stats = self.fields.entry(key.to_string()).or_default();
        if stats.excluded {
            return;
        }

        let len = value.chars().count();
        stats.max_len = stats.max_len.max(len);
        if len > self.max_value_length {
            stats.excluded = true;
            stats.distinct = HashSet::new();
            return;
        }

        if !stats.distinct.contains(value) {
            stats.distinct.insert(value.to_string());
            if stats.distinct.len() > self.max_distinct {
                stats.excluded = true;
                stats.distinct = HashSet::new();
            }
        }
    }

    /// Whether a field may be used as a facet.
    ///
    /// Fields never observed with a value are eligible.
    pub fn is_facetable(&self, key: &str) -> bool {
        self.fields.get(key).map(|s| !s.excluded).unwrap_or(true)
    }

    /// Longest value seen for a field, in characters
    pub fn max_len(&self, key: &str) -> usize {
        self.fields.get(key).map(|s| s.max_len).unwrap_or(0)
    }

    /// Facet-eligible subset of `fields`, order preserved
    pub fn facets(&self, fields: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter(|f| self.is_facetable(f))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_limit_is_inclusive() {
        let mut tracker = FacetTracker::new(30, 30);
        for i in 0..30 {
            tracker.observe("status", &format!("v{i}"));
        }
        assert!(tracker.is_facetable("status"));

        tracker.observe("status", "v30");
        assert!(!tracker.is_facetable("status"));

        // once excluded, stays excluded
        tracker.observe("status", "v0");
        assert!(!tracker.is_facetable("status"));
    }

    #[test]
    fn test_repeated_values_do_not_count() {
        let mut tracker = FacetTracker::new(2, 30);
        for _ in 0..100 {
            tracker.observe("habit", "tree");
            tracker.observe("habit", "shrub");
        }
        assert!(tracker.is_facetable("habit"));
    }

    #[test]
    fn test_long_value_excludes() {
        let mut tracker = FacetTracker::new(30, 30);
        tracker.observe("note", &"x".repeat(30));
        assert!(tracker.is_facetable("note"));
        tracker.observe("note", &"x".repeat(31));
        assert!(!tracker.is_facetable("note"));
        assert_eq!(tracker.max_len("note"), 31);
    }

    #[test]
    fn test_length_counts_characters() {
        let mut tracker = FacetTracker::new(30, 3);
        tracker.observe("name", "éé");
        assert!(tracker.is_facetable("name"));
    }

    #[test]
    fn test_facets_preserve_field_order() {
        let mut tracker = FacetTracker::new(1, 30);
        tracker.observe("b", "1");
        tracker.observe("b", "2");
        let fields = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(tracker.facets(&fields), vec!["a", "c"]);
    }
}
