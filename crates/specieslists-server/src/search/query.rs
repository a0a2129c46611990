//! Engine-neutral query AST
//!
//! Queries are plain immutable values. Adapters translate them: the
//! Elasticsearch adapter renders query DSL, the in-memory index evaluates them
//! directly.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    /// Exact value on a keyword or boolean path
    Term {
        field: String,
        value: Value,
        boost: Option<f32>,
    },
    /// All tokens, adjacent and in order
    Phrase {
        field: String,
        text: String,
        boost: Option<f32>,
    },
    /// Like `Phrase`, with the last token matched as a prefix
    PhrasePrefix {
        field: String,
        text: String,
        boost: Option<f32>,
    },
    /// Every token within an automatic edit distance
    Fuzzy {
        field: String,
        text: String,
        boost: Option<f32>,
    },
    /// Any token
    Match {
        field: String,
        text: String,
        boost: Option<f32>,
    },
    Bool(BoolQuery),
    /// Inner query must match a single element of the nested array at `path`
    Nested { path: String, query: Box<Query> },
    Range {
        field: String,
        gte: Option<Value>,
        lte: Option<Value>,
    },
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    pub fn phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Phrase {
            field: field.into(),
            text: text.into(),
            boost: None,
        }
    }

    pub fn phrase_prefix(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::PhrasePrefix {
            field: field.into(),
            text: text.into(),
            boost: None,
        }
    }

    pub fn fuzzy(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Fuzzy {
            field: field.into(),
            text: text.into(),
            boost: None,
        }
    }

    pub fn matches(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Match {
            field: field.into(),
            text: text.into(),
            boost: None,
        }
    }

    pub fn nested(path: impl Into<String>, query: Query) -> Self {
        Query::Nested {
            path: path.into(),
            query: Box::new(query),
        }
    }

    /// Same query with a relevance boost; no effect on structural variants
    pub fn boosted(self, factor: f32) -> Self {
        match self {
            Query::Term { field, value, .. } => Query::Term {
                field,
                value,
                boost: Some(factor),
            },
            Query::Phrase { field, text, .. } => Query::Phrase {
                field,
                text,
                boost: Some(factor),
            },
            Query::PhrasePrefix { field, text, .. } => Query::PhrasePrefix {
                field,
                text,
                boost: Some(factor),
            },
            Query::Fuzzy { field, text, .. } => Query::Fuzzy {
                field,
                text,
                boost: Some(factor),
            },
            Query::Match { field, text, .. } => Query::Match {
                field,
                text,
                boost: Some(factor),
            },
            other => other,
        }
    }
}

/// Boolean combination. An empty `BoolQuery` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub filter: Vec<Query>,
    pub must_not: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn minimum_should_match(mut self, n: u32) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    /// Disjunction requiring at least one clause
    pub fn any_of(queries: Vec<Query>) -> Self {
        Self {
            should: queries,
            minimum_should_match: Some(1),
            ..Default::default()
        }
    }

    /// Should-clauses needed for a match, following Elasticsearch's default:
    /// one when there are no must/filter clauses, otherwise none.
    pub fn required_should(&self) -> usize {
        match self.minimum_should_match {
            Some(n) => n as usize,
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }

    pub fn build(self) -> Query {
        Query::Bool(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boosted_only_touches_leaf_queries() {
        let q = Query::phrase("all", "fox").boosted(3.0);
        assert_eq!(
            q,
            Query::Phrase {
                field: "all".to_string(),
                text: "fox".to_string(),
                boost: Some(3.0)
            }
        );
        assert_eq!(Query::MatchAll.boosted(2.0), Query::MatchAll);
    }

    #[test]
    fn test_required_should_defaults() {
        let only_should = BoolQuery::new().should(Query::MatchAll);
        assert_eq!(only_should.required_should(), 1);

        let with_filter = BoolQuery::new()
            .should(Query::MatchAll)
            .filter(Query::term("isPrivate", false));
        assert_eq!(with_filter.required_should(), 0);

        let explicit = with_filter.minimum_should_match(1);
        assert_eq!(explicit.required_should(), 1);
    }
}
