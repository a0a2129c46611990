//! Species Lists Server Library
//!
//! Ingests tabular species checklists, matches every row against a taxonomic
//! name service and keeps two representations in step: the canonical store
//! and a denormalized, faceted search index.
//!
//! # Overview
//!
//! - **Ingestion**: parse CSV/TSV/zip uploads into records plus a discovered
//!   field and facet schema ([`ingest`])
//! - **Matching**: resolve names to classifications on a bounded worker pool
//!   ([`matching`], [`jobs`])
//! - **Indexing**: project records onto search documents ([`index`])
//! - **Search**: boolean and faceted queries with visibility rules ([`search`])
//! - **Releases**: immutable CSV snapshots per list version ([`release`])
//!
//! # Architecture
//!
//! Storage, search engine, name service, artifact storage and authorization
//! each sit behind a trait, with a production adapter and an in-memory one:
//!
//! | Seam | Production | In-memory / local |
//! |------|------------|-------------------|
//! | [`db::CanonicalStore`] | [`db::PgStore`] (SQLx) | [`db::MemoryStore`] |
//! | [`index::SearchIndex`] | [`index::ElasticIndex`] (reqwest) | [`index::MemoryIndex`] |
//! | [`matching::NameResolver`] | [`matching::HttpNameResolver`] | - |
//! | [`storage::ArtifactStore`] | [`storage::S3ArtifactStore`] | [`storage::LocalArtifactStore`] |
//! | [`search::AccessPolicy`] | [`search::RolePolicy`] | - |
//!
//! Operations are exposed as command and query slices under [`features`],
//! each taking the shared [`features::FeatureState`].
//!
//! # Example
//!
//! ```no_run
//! use specieslists_server::{config::Config, features::FeatureState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = FeatureState::from_config(&config).await?;
//!     let handle = state.sync.reindex_all()?;
//!     handle.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod index;
pub mod ingest;
pub mod jobs;
pub mod matching;
pub mod models;
pub mod release;
pub mod search;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, AppResult};
