//! Server-specific error types
//!
//! Each layer owns a focused error enum (`DbError`, `IndexError`,
//! `ResolveError`, `JobError`, ...). [`AppError`] is the umbrella used where
//! an operation spans more than one of them.

use thiserror::Error;

use crate::db::DbError;
use crate::index::IndexError;
use crate::jobs::JobError;
use crate::matching::ResolveError;

/// Result type alias for operations spanning several layers
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Search index error: {0}")]
    Index(#[from] IndexError),

    #[error("Name matching error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] specieslists_common::CommonError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource_type: &str, identifier: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} '{}' not found", resource_type, identifier))
    }

    pub fn forbidden(action: &str) -> Self {
        Self::Forbidden(format!("caller may not {}", action))
    }

    /// Whether the error describes the caller's request rather than a backend failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::Validation(_) | AppError::Forbidden(_)
        ) || matches!(self, AppError::Database(DbError::VersionConflict { .. }))
    }
}
