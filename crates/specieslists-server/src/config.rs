//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::db::DbConfig;
use crate::storage::config::StorageConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/specieslists";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default search engine endpoint.
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";

/// Default search index name.
pub const DEFAULT_SEARCH_INDEX: &str = "species-lists";

/// Largest `from + size` the search engine will page to.
pub const DEFAULT_MAX_RESULT_WINDOW: u64 = 10_000;

/// Documents per bulk indexing request.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 1_000;

/// Default name matching service.
pub const DEFAULT_NAMEMATCHING_URL: &str = "https://namematching-ws.ala.org.au";

/// Name matching request timeout in seconds.
pub const DEFAULT_NAMEMATCHING_TIMEOUT_SECS: u64 = 10;

/// Background job workers.
pub const DEFAULT_JOB_WORKERS: usize = 2;

/// Pending jobs accepted before submissions are rejected.
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 16;

/// Records read or written per store round trip.
pub const DEFAULT_INGEST_PAGE_SIZE: usize = 1_000;

/// A field with more distinct values than this is not a facet.
pub const DEFAULT_FACET_MAX_DISTINCT: usize = 30;

/// A field with any value longer than this (in characters) is not a facet.
pub const DEFAULT_FACET_MAX_VALUE_LENGTH: usize = 30;

/// Default directory for locally stored release artifacts.
pub const DEFAULT_RELEASE_DIR: &str = "./releases";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub namematching: NameMatchingConfig,
    pub jobs: JobConfig,
    pub ingest: IngestConfig,
    pub release: ReleaseConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_result_window: u64,
    pub bulk_batch_size: usize,
}

/// Name matching service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameMatchingConfig {
    pub url: String,
    pub timeout_secs: u64,
}

/// Background job pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub page_size: usize,
    pub facet_max_distinct: usize,
    pub facet_max_value_length: usize,
}

/// Where release artifacts are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseBackend {
    Local,
    S3,
}

impl FromStr for ReleaseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "file" => Ok(ReleaseBackend::Local),
            "s3" => Ok(ReleaseBackend::S3),
            _ => Err(anyhow::anyhow!("Invalid release backend: {}", s)),
        }
    }
}

/// Release artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub backend: ReleaseBackend,
    pub dir: PathBuf,
    pub s3: Option<StorageConfig>,
}

/// Tunables shared by the ingestion, matching and indexing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub page_size: usize,
    pub bulk_batch_size: usize,
    pub facet_max_distinct: usize,
    pub facet_max_value_length: usize,
    pub job_workers: usize,
    pub job_queue_capacity: usize,
    pub max_result_window: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_INGEST_PAGE_SIZE,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            facet_max_distinct: DEFAULT_FACET_MAX_DISTINCT,
            facet_max_value_length: DEFAULT_FACET_MAX_VALUE_LENGTH,
            job_workers: DEFAULT_JOB_WORKERS,
            job_queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
            max_result_window: DEFAULT_MAX_RESULT_WINDOW,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match std::env::var("RELEASE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => ReleaseBackend::Local,
        };
        let s3 = match backend {
            ReleaseBackend::S3 => Some(StorageConfig::from_env()?),
            ReleaseBackend::Local => None,
        };

        let config = Config {
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            search: SearchConfig {
                url: env_string("SEARCH_URL", DEFAULT_SEARCH_URL),
                index: env_string("SEARCH_INDEX", DEFAULT_SEARCH_INDEX),
                username: std::env::var("SEARCH_USERNAME").ok(),
                password: std::env::var("SEARCH_PASSWORD").ok(),
                max_result_window: env_or("SEARCH_MAX_RESULT_WINDOW", DEFAULT_MAX_RESULT_WINDOW),
                bulk_batch_size: env_or("SEARCH_BULK_BATCH_SIZE", DEFAULT_BULK_BATCH_SIZE),
            },
            namematching: NameMatchingConfig {
                url: env_string("NAMEMATCHING_URL", DEFAULT_NAMEMATCHING_URL),
                timeout_secs: env_or("NAMEMATCHING_TIMEOUT_SECS", DEFAULT_NAMEMATCHING_TIMEOUT_SECS),
            },
            jobs: JobConfig {
                workers: env_or("JOB_WORKERS", DEFAULT_JOB_WORKERS),
                queue_capacity: env_or("JOB_QUEUE_CAPACITY", DEFAULT_JOB_QUEUE_CAPACITY),
            },
            ingest: IngestConfig {
                page_size: env_or("INGEST_PAGE_SIZE", DEFAULT_INGEST_PAGE_SIZE),
                facet_max_distinct: env_or("FACET_MAX_DISTINCT", DEFAULT_FACET_MAX_DISTINCT),
                facet_max_value_length: env_or(
                    "FACET_MAX_VALUE_LENGTH",
                    DEFAULT_FACET_MAX_VALUE_LENGTH,
                ),
            },
            release: ReleaseConfig {
                backend,
                dir: PathBuf::from(env_string("RELEASE_DIR", DEFAULT_RELEASE_DIR)),
                s3,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.search.url.is_empty() || self.search.index.is_empty() {
            anyhow::bail!("Search URL and index name must be set");
        }

        if self.search.max_result_window == 0 {
            anyhow::bail!("Search max_result_window must be greater than 0");
        }

        if self.search.bulk_batch_size == 0 || self.ingest.page_size == 0 {
            anyhow::bail!("Batch and page sizes must be greater than 0");
        }

        if self.jobs.workers == 0 || self.jobs.queue_capacity == 0 {
            anyhow::bail!("Job workers and queue capacity must be greater than 0");
        }

        if self.release.backend == ReleaseBackend::S3 && self.release.s3.is_none() {
            anyhow::bail!("RELEASE_BACKEND=s3 requires S3 storage settings");
        }

        if self.search.username.is_some() != self.search.password.is_some() {
            tracing::warn!("Only one of SEARCH_USERNAME / SEARCH_PASSWORD set - ignoring credentials");
        }

        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            connect_timeout_secs: self.database.connect_timeout_secs,
            idle_timeout_secs: None,
            max_lifetime_secs: None,
        }
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            page_size: self.ingest.page_size,
            bulk_batch_size: self.search.bulk_batch_size,
            facet_max_distinct: self.ingest.facet_max_distinct,
            facet_max_value_length: self.ingest.facet_max_value_length,
            job_workers: self.jobs.workers,
            job_queue_capacity: self.jobs.queue_capacity,
            max_result_window: self.search.max_result_window,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            search: SearchConfig {
                url: DEFAULT_SEARCH_URL.to_string(),
                index: DEFAULT_SEARCH_INDEX.to_string(),
                username: None,
                password: None,
                max_result_window: DEFAULT_MAX_RESULT_WINDOW,
                bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
            },
            namematching: NameMatchingConfig {
                url: DEFAULT_NAMEMATCHING_URL.to_string(),
                timeout_secs: DEFAULT_NAMEMATCHING_TIMEOUT_SECS,
            },
            jobs: JobConfig {
                workers: DEFAULT_JOB_WORKERS,
                queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
            },
            ingest: IngestConfig {
                page_size: DEFAULT_INGEST_PAGE_SIZE,
                facet_max_distinct: DEFAULT_FACET_MAX_DISTINCT,
                facet_max_value_length: DEFAULT_FACET_MAX_VALUE_LENGTH,
            },
            release: ReleaseConfig {
                backend: ReleaseBackend::Local,
                dir: PathBuf::from(DEFAULT_RELEASE_DIR),
                s3: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline(), PipelineSettings::default());
    }

    #[test]
    fn test_invalid_pool_bounds() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_backend_requires_settings() {
        let mut config = Config::default();
        config.release.backend = ReleaseBackend::S3;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_reads_environment() {
        std::env::set_var("JOB_WORKERS", "4");
        std::env::set_var("SEARCH_MAX_RESULT_WINDOW", "500");
        std::env::set_var("RELEASE_BACKEND", "local");

        let config = Config::load().unwrap();
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.pipeline().max_result_window, 500);
        assert_eq!(config.release.backend, ReleaseBackend::Local);

        std::env::remove_var("JOB_WORKERS");
        std::env::remove_var("SEARCH_MAX_RESULT_WINDOW");
        std::env::remove_var("RELEASE_BACKEND");
    }

    #[test]
    fn test_release_backend_parse() {
        assert_eq!("S3".parse::<ReleaseBackend>().unwrap(), ReleaseBackend::S3);
        assert!("ftp".parse::<ReleaseBackend>().is_err());
    }
}
