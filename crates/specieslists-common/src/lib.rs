//! Species Lists Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the species lists workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by `LOG_*` variables
//! - **Checksums**: SHA-256 digests for release artifacts
//! - **Formats**: detection of supported checklist upload formats
//!
//! # Example
//!
//! ```no_run
//! use specieslists_common::format::UploadFormat;
//!
//! let format = UploadFormat::detect(Some("text/csv"), Some("birds.csv")).unwrap();
//! assert_eq!(format, UploadFormat::Csv);
//! ```

pub mod checksum;
pub mod error;
pub mod format;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
