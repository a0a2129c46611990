//! Record and list search
//!
//! Both queries go through [`crate::search::QueryBuilder`], so every result
//! is scoped to what the caller may see.

pub mod queries;

pub use queries::{
    ListSummary, RecordHit, SearchListsError, SearchListsQuery, SearchListsResponse, SearchRecordsError,
    SearchRecordsQuery, SearchRecordsResponse,
};
