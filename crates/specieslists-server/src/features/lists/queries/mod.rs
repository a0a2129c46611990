pub mod get;
pub mod progress;
pub mod releases;

pub use get::{GetListError, GetListQuery};
pub use progress::{GetMigrationProgressQuery, GetProgressError, GetProgressQuery};
pub use releases::{ListReleasesError, ListReleasesQuery};
