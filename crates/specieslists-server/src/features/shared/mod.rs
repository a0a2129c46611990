//! Shared utilities and types for feature modules
//!
//! # Contents
//!
//! - **pagination**: Common pagination types and helpers
//! - **validation**: Input validation utilities
//! - **test_helpers**: Test fixtures and utilities (test-only)

pub mod pagination;
pub mod validation;

#[cfg(test)]
pub mod test_helpers;

// Re-export commonly used types
pub use pagination::{Paginated, PaginationError, PaginationMetadata, PaginationParams};
pub use validation::{validate_metadata, validate_name, MetadataValidationError, NameValidationError};
