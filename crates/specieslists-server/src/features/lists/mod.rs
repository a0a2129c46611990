//! Species list management
//!
//! Commands create, ingest into, edit, delete and release lists. Queries
//! read lists, their ingestion progress and their releases.

pub mod commands;
pub mod queries;

pub use commands::{
    CreateListCommand, CreateListError, CreateListResponse, DeleteListCommand, DeleteListError,
    DeleteListResponse, DeleteRecordCommand, DeleteRecordError, DeleteRecordResponse, IngestCommand,
    IngestCommandError, IngestResponse, MetadataPatch, ReingestCommand, ReingestError, ReingestResponse,
    ReleaseListCommand, ReleaseListError, UpdateListMetadataCommand, UpdateListMetadataError,
    UpdateListMetadataResponse, UpsertRecordCommand, UpsertRecordError, UpsertRecordResponse,
};
pub use queries::{
    GetListError, GetListQuery, GetMigrationProgressQuery, GetProgressError, GetProgressQuery,
    ListReleasesError, ListReleasesQuery,
};

use uuid::Uuid;

use crate::db::{CanonicalStore, DbError, DbResult};
use crate::models::SpeciesList;

const MAX_LIST_UPDATE_ATTEMPTS: usize = 3;

/// Apply a change to the stored list, retrying on version conflicts.
///
/// Used for edits made by the service itself (record counts, field lists),
/// which must not fail because a background job moved the version on.
pub(crate) async fn bump_list<F>(store: &dyn CanonicalStore, list_id: Uuid, mut change: F) -> DbResult<SpeciesList>
where
    F: FnMut(&mut SpeciesList),
{
    let mut attempt = 1;
    loop {
        let mut list = store
            .get_list(list_id)
            .await?
            .ok_or_else(|| DbError::not_found("List", &list_id.to_string()))?;
        change(&mut list);

        match store.update_list(&list).await {
            Err(DbError::VersionConflict { .. }) if attempt < MAX_LIST_UPDATE_ATTEMPTS => attempt += 1,
            result => return result,
        }
    }
}
