//! Background matching and indexing runs
//!
//! Runs for one list need owner or admin rights; runs over every list need
//! admin rights. Progress is read through the lists feature.

pub mod commands;

pub use commands::{
    JobAccepted, ReindexCommand, ReindexError, RematchCommand, RematchError,
};

use uuid::Uuid;

use crate::db::DbError;
use crate::features::FeatureState;
use crate::search::{can_administer, CallerContext};

/// Who may start a run over `list_id`, or over all lists when `None`
#[derive(Debug, thiserror::Error)]
pub enum RunPermissionError {
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not start this run")]
    Forbidden,
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub(crate) async fn check_run_permission(
    state: &FeatureState,
    caller: &CallerContext,
    list_id: Option<Uuid>,
) -> Result<(), RunPermissionError> {
    let policy = state.policy.as_ref();
    let allowed = match list_id {
        Some(id) => {
            let list = state.store.get_list(id).await?.ok_or(RunPermissionError::NotFound(id))?;
            can_administer(policy, caller, &list)
        },
        None => policy.is_admin(caller),
    };
    if allowed {
        Ok(())
    } else {
        Err(RunPermissionError::Forbidden)
    }
}
