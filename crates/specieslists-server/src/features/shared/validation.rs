//! Shared validation utilities
//!
//! # Examples
//!
//! ```rust,ignore
//! use specieslists_server::features::shared::validation::{validate_name, MAX_TITLE_LENGTH};
//!
//! validate_name(&command.title, MAX_TITLE_LENGTH)?;
//! ```

use thiserror::Error;

use crate::models::ListMetadata;

pub const MAX_TITLE_LENGTH: usize = 256;
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;
pub const MAX_TAG_LENGTH: usize = 64;

/// Errors that can occur during name validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameValidationError {
    #[error("Name is required and cannot be empty")]
    Required,

    #[error("Name must be between 1 and {max_length} characters")]
    TooLong { max_length: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataValidationError {
    #[error("Title: {0}")]
    Title(NameValidationError),

    #[error("Description must be at most 10000 characters")]
    DescriptionTooLong,

    #[error("Licence is required and cannot be empty")]
    LicenceRequired,

    #[error("Tag {0:?} must be between 1 and 64 characters")]
    InvalidTag(String),
}

/// Validate a name or title
///
/// # Rules
/// - Must not be blank
/// - At most `max_length` characters
pub fn validate_name(name: &str, max_length: usize) -> Result<(), NameValidationError> {
    if name.trim().is_empty() {
        return Err(NameValidationError::Required);
    }

    if name.chars().count() > max_length {
        return Err(NameValidationError::TooLong { max_length });
    }

    Ok(())
}

/// Validate the owner-supplied attributes of a list
pub fn validate_metadata(metadata: &ListMetadata) -> Result<(), MetadataValidationError> {
    validate_name(&metadata.title, MAX_TITLE_LENGTH).map_err(MetadataValidationError::Title)?;

    if let Some(description) = &metadata.description {
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(MetadataValidationError::DescriptionTooLong);
        }
    }

    if metadata.licence.trim().is_empty() {
        return Err(MetadataValidationError::LicenceRequired);
    }

    if let Some(tag) = metadata
        .tags
        .iter()
        .find(|t| t.trim().is_empty() || t.chars().count() > MAX_TAG_LENGTH)
    {
        return Err(MetadataValidationError::InvalidTag(tag.clone()));
    }

    Ok(())
}
