//! Feature slices
//!
//! Each feature is a vertical slice of commands (writes) and queries (reads).
//! Every command or query is a module with its own request type, response
//! type, error enum, `validate()` and a `handle()` function taking the shared
//! [`FeatureState`].
//!
//! # Features
//!
//! - **lists**: create, ingest, reingest, edit, delete and release species lists
//! - **search**: faceted record search and list-name search
//! - **jobs**: rematch and reindex runs
//!
//! [`FeatureState`] wires the storage, index, resolver and artifact backends
//! into the pipeline components once per process.

pub mod jobs;
pub mod lists;
pub mod search;
pub mod shared;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, PipelineSettings, ReleaseBackend};
use crate::db::{CanonicalStore, PgStore};
use crate::index::{ElasticIndex, IndexSynchronizer, SearchIndex};
use crate::ingest::Loader;
use crate::jobs::{JobDispatcher, JobPool, ProgressStore};
use crate::matching::{HttpNameResolver, NameResolver, TaxonMatcher};
use crate::release::ReleaseBuilder;
use crate::search::{AccessPolicy, QueryBuilder, RolePolicy};
use crate::storage::{ArtifactStore, LocalArtifactStore, S3ArtifactStore};

/// External collaborators the application runs against
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn CanonicalStore>,
    pub index: Arc<dyn SearchIndex>,
    pub resolver: Arc<dyn NameResolver>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub policy: Arc<dyn AccessPolicy>,
}

impl Backends {
    /// Connect to PostgreSQL, the search cluster, the name matching service
    /// and the configured artifact store. Runs pending migrations and creates
    /// the search index when missing.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = crate::db::create_pool(&config.db_config())
            .await
            .context("Failed to connect to database")?;
        let store = PgStore::new(pool);
        store.migrate().await.context("Failed to run migrations")?;

        let index = ElasticIndex::new(&config.search).context("Failed to build search client")?;
        index
            .ensure_index()
            .await
            .context("Failed to prepare search index")?;

        let resolver = HttpNameResolver::new(
            config.namematching.url.clone(),
            Duration::from_secs(config.namematching.timeout_secs),
        )
        .context("Failed to build name matching client")?;

        let artifacts: Arc<dyn ArtifactStore> = match (config.release.backend, &config.release.s3) {
            (ReleaseBackend::S3, Some(s3)) => Arc::new(S3ArtifactStore::new(s3.clone()).await?),
            (ReleaseBackend::S3, None) => anyhow::bail!("RELEASE_BACKEND=s3 requires S3 storage settings"),
            (ReleaseBackend::Local, _) => Arc::new(LocalArtifactStore::new(config.release.dir.clone())),
        };

        info!(
            search = %config.search.url,
            namematching = %config.namematching.url,
            release_backend = ?config.release.backend,
            "Backends connected"
        );

        Ok(Self {
            store: Arc::new(store),
            index: Arc::new(index),
            resolver: Arc::new(resolver),
            artifacts,
            policy: Arc::new(RolePolicy::default()),
        })
    }
}

/// Shared state for all feature handlers
#[derive(Clone)]
pub struct FeatureState {
    pub store: Arc<dyn CanonicalStore>,
    pub index: Arc<dyn SearchIndex>,
    pub resolver: Arc<dyn NameResolver>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub policy: Arc<dyn AccessPolicy>,
    pub progress: ProgressStore,
    pub loader: Loader,
    pub matcher: TaxonMatcher,
    pub dispatcher: JobDispatcher,
    pub sync: IndexSynchronizer,
    pub releases: ReleaseBuilder,
    pub queries: QueryBuilder,
    pub settings: PipelineSettings,
}

impl FeatureState {
    /// Wire the pipeline. Starts the job pool, so must run inside a tokio
    /// runtime.
    pub fn new(backends: Backends, settings: PipelineSettings) -> anyhow::Result<Self> {
        let Backends {
            store,
            index,
            resolver,
            artifacts,
            policy,
        } = backends;

        let progress = ProgressStore::new();
        let matcher = TaxonMatcher::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&index),
            progress.clone(),
            settings,
        );
        let pool = JobPool::start(settings.job_workers, settings.job_queue_capacity);
        let dispatcher = JobDispatcher::new(pool, matcher.clone());
        let loader = Loader::new(Arc::clone(&store), dispatcher.clone(), progress.clone(), settings)
            .context("Failed to compile field normalization patterns")?;
        let sync = IndexSynchronizer::new(Arc::clone(&store), Arc::clone(&index), dispatcher.clone());
        let releases = ReleaseBuilder::new(Arc::clone(&store), Arc::clone(&artifacts), settings.page_size);
        let queries = QueryBuilder::new(Arc::clone(&policy), settings.max_result_window);

        Ok(Self {
            store,
            index,
            resolver,
            artifacts,
            policy,
            progress,
            loader,
            matcher,
            dispatcher,
            sync,
            releases,
            queries,
            settings,
        })
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let backends = Backends::connect(config).await?;
        Self::new(backends, config.pipeline())
    }
}
