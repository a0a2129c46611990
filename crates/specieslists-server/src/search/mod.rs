//! Record and list search
//!
//! Searches are assembled as a [`query::Query`] tree by [`QueryBuilder`] and
//! handed to whichever [`crate::index::SearchIndex`] is configured.

pub mod builder;
pub mod query;
pub mod visibility;

pub use builder::{Filter, QueryBuilder, QueryError, RecordSearch};
pub use query::{BoolQuery, Query};
pub use visibility::{can_administer, can_edit, can_view, AccessPolicy, CallerContext, RolePolicy};
