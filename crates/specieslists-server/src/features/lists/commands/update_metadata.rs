//! Edit a list's metadata under optimistic concurrency

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbError;
use crate::features::shared::validation::{validate_metadata, MetadataValidationError};
use crate::features::FeatureState;
use crate::index::IndexSynchronizer;
use crate::jobs::JobHandle;
use crate::models::{ListType, SpeciesList};
use crate::search::{can_administer, can_edit, CallerContext};

/// Fields to change; `None` leaves a field as it is. An empty description or
/// region clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_type: Option<ListType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_authoritative: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_threatened: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_invasive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editors: Option<Vec<String>>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether applying the patch could change who sees or edits the list
    fn touches_access(&self, list: &SpeciesList) -> bool {
        self.is_private.is_some_and(|p| p != list.metadata.is_private)
            || self.editors.as_ref().is_some_and(|e| *e != list.editors)
    }

    fn apply(&self, list: &mut SpeciesList) {
        let metadata = &mut list.metadata;
        if let Some(title) = &self.title {
            metadata.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            metadata.description = non_empty(description);
        }
        if let Some(list_type) = self.list_type {
            metadata.list_type = list_type;
        }
        if let Some(licence) = &self.licence {
            metadata.licence = licence.trim().to_string();
        }
        if let Some(is_private) = self.is_private {
            metadata.is_private = is_private;
        }
        if let Some(is_authoritative) = self.is_authoritative {
            metadata.is_authoritative = is_authoritative;
        }
        if let Some(is_threatened) = self.is_threatened {
            metadata.is_threatened = is_threatened;
        }
        if let Some(is_invasive) = self.is_invasive {
            metadata.is_invasive = is_invasive;
        }
        if let Some(region) = &self.region {
            metadata.region = non_empty(region);
        }
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
        if let Some(editors) = &self.editors {
            list.editors = editors.clone();
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListMetadataCommand {
    pub list_id: Uuid,
    /// Version the caller last read; the update fails if the list moved on
    pub expected_version: i64,
    pub patch: MetadataPatch,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListMetadataResponse {
    pub list: SpeciesList,
    pub reindex_scheduled: bool,
    /// Document rebuild carrying the new attributes
    #[serde(skip)]
    pub reindex: Option<JobHandle>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateListMetadataError {
    #[error("At least one field must be provided for update")]
    NoFieldsToUpdate,
    #[error("Invalid list metadata: {0}")]
    Validation(#[from] MetadataValidationError),
    #[error("Species list '{0}' not found")]
    NotFound(Uuid),
    #[error("Caller may not {action} species list '{list_id}'")]
    Forbidden { list_id: Uuid, action: &'static str },
    #[error("Species list was modified: expected version {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },
    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for UpdateListMetadataError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::VersionConflict { expected, actual } => Self::VersionConflict { expected, actual },
            other => Self::Database(other),
        }
    }
}

impl UpdateListMetadataCommand {
    pub fn validate(&self) -> Result<(), UpdateListMetadataError> {
        if self.patch.is_empty() {
            return Err(UpdateListMetadataError::NoFieldsToUpdate);
        }
        Ok(())
    }
}

/// Apply a metadata patch.
///
/// Owners, editors and admins may edit; only owners and admins may change
/// visibility or the editor list. When a projected attribute changes the
/// list's documents are rebuilt in the background.
#[tracing::instrument(skip(state, command), fields(list_id = %command.list_id))]
pub async fn handle(
    state: &FeatureState,
    caller: &CallerContext,
    command: UpdateListMetadataCommand,
) -> Result<UpdateListMetadataResponse, UpdateListMetadataError> {
    command.validate()?;

    let current = state
        .store
        .get_list(command.list_id)
        .await?
        .ok_or(UpdateListMetadataError::NotFound(command.list_id))?;

    let policy = state.policy.as_ref();
    if !can_edit(policy, caller, &current) {
        return Err(UpdateListMetadataError::Forbidden {
            list_id: current.id,
            action: "edit",
        });
    }
    if command.patch.touches_access(&current) && !can_administer(policy, caller, &current) {
        return Err(UpdateListMetadataError::Forbidden {
            list_id: current.id,
            action: "change access to",
        });
    }
    if current.version != command.expected_version {
        return Err(UpdateListMetadataError::VersionConflict {
            expected: command.expected_version,
            actual: current.version,
        });
    }

    let mut proposed = current.clone();
    command.patch.apply(&mut proposed);
    validate_metadata(&proposed.metadata)?;

    let reindex = IndexSynchronizer::requires_reindex(&current, &proposed);
    let updated = state.store.update_list(&proposed).await?;
    info!(version = updated.version, reindex, "List metadata updated");

    let reindex = if reindex {
        match state.sync.reindex(updated.id) {
            Ok(handle) => {
                info!(job_id = %handle.id, "Scheduled reindex");
                Some(handle)
            },
            Err(e) => {
                warn!(error = %e, "Could not schedule reindex; documents keep the old attributes");
                None
            },
        }
    } else {
        None
    };

    Ok(UpdateListMetadataResponse {
        list: updated,
        reindex_scheduled: reindex.is_some(),
        reindex,
    })
}
