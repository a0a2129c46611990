pub mod create;
pub mod delete;
pub mod delete_record;
pub mod ingest;
pub mod reingest;
pub mod release;
pub mod update_metadata;
pub mod upsert_record;

pub use create::{CreateListCommand, CreateListError, CreateListResponse};
pub use delete::{DeleteListCommand, DeleteListError, DeleteListResponse};
pub use delete_record::{DeleteRecordCommand, DeleteRecordError, DeleteRecordResponse};
pub use ingest::{IngestCommand, IngestCommandError, IngestResponse};
pub use reingest::{ReingestCommand, ReingestError, ReingestResponse};
pub use release::{ReleaseListCommand, ReleaseListError};
pub use update_metadata::{
    MetadataPatch, UpdateListMetadataCommand, UpdateListMetadataError, UpdateListMetadataResponse,
};
pub use upsert_record::{UpsertRecordCommand, UpsertRecordError, UpsertRecordResponse};
