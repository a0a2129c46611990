pub mod reindex;
pub mod rematch;

pub use reindex::{ReindexCommand, ReindexError};
pub use rematch::{RematchCommand, RematchError};

use serde::Serialize;
use uuid::Uuid;

use crate::jobs::{JobHandle, JobKind};

/// A run accepted onto the job queue
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub kind: JobKind,
    #[serde(skip)]
    pub handle: JobHandle,
}

impl From<JobHandle> for JobAccepted {
    fn from(handle: JobHandle) -> Self {
        Self {
            job_id: handle.id,
            kind: handle.kind,
            handle,
        }
    }
}
