pub mod lists;
pub mod records;

pub use lists::{ListSummary, SearchListsError, SearchListsQuery, SearchListsResponse};
pub use records::{RecordHit, SearchRecordsError, SearchRecordsQuery, SearchRecordsResponse};
