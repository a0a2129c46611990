//! Shared fixtures for integration tests
//!
//! Every test gets its own in-memory store and index, a name resolver backed
//! by a fixed table and a temporary directory for release artifacts.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use specieslists_server::config::PipelineSettings;
use specieslists_server::db::MemoryStore;
use specieslists_server::features::lists::commands::{self as list_commands, CreateListCommand};
use specieslists_server::features::{Backends, FeatureState};
use specieslists_server::index::MemoryIndex;
use specieslists_server::ingest::Upload;
use specieslists_server::matching::{NameQuery, NameResolver, ResolveError};
use specieslists_server::models::{Classification, ListMetadata, ListType, SpeciesList};
use specieslists_server::search::{CallerContext, RolePolicy};
use specieslists_server::storage::LocalArtifactStore;

/// Resolver answering from a name table; unknown names come back unmatched
#[derive(Default)]
pub struct TableResolver {
    names: Mutex<HashMap<String, Classification>>,
}

impl TableResolver {
    pub fn accept(&self, name: &str, concept: &str, kingdom: &str) {
        let classification = Classification {
            success: true,
            scientific_name: Some(name.to_string()),
            taxon_concept_id: Some(concept.to_string()),
            rank: Some("species".to_string()),
            match_type: Some("exactMatch".to_string()),
            kingdom: Some(kingdom.to_string()),
            ..Default::default()
        };
        self.names.lock().unwrap().insert(name.to_string(), classification);
    }
}

#[async_trait]
impl NameResolver for TableResolver {
    async fn resolve(&self, query: &NameQuery) -> Result<Classification, ResolveError> {
        Ok(self
            .names
            .lock()
            .unwrap()
            .get(&query.scientific_name)
            .cloned()
            .unwrap_or_else(|| Classification::unmatched(vec!["noMatch".to_string()])))
    }
}

pub struct TestEnvironment {
    pub state: FeatureState,
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub resolver: Arc<TableResolver>,
    pub release_dir: TempDir,
}

impl TestEnvironment {
    pub fn start() -> Self {
        Self::with_settings(PipelineSettings::default())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new(settings.max_result_window));
        let resolver = Arc::new(TableResolver::default());
        let release_dir = tempfile::tempdir().expect("Failed to create release dir");

        let backends = Backends {
            store: store.clone(),
            index: index.clone(),
            resolver: resolver.clone(),
            artifacts: Arc::new(LocalArtifactStore::new(release_dir.path())),
            policy: Arc::new(RolePolicy::default()),
        };
        let state = FeatureState::new(backends, settings).expect("Failed to build feature state");

        Self {
            state,
            store,
            index,
            resolver,
            release_dir,
        }
    }

    /// Create a list from CSV text as `owner` and wait for it to be indexed
    pub async fn create_list(&self, owner: &str, title: &str, private: bool, csv: &str) -> SpeciesList {
        let mut metadata = ListMetadata::new(title, ListType::LocalList);
        metadata.is_private = private;
        let command = CreateListCommand {
            metadata,
            upload: Upload::new("upload.csv", csv),
        };

        let response = list_commands::create::handle(&self.state, &CallerContext::user(owner), command)
            .await
            .expect("Failed to create list");
        if let Some(indexing) = response.indexing {
            indexing.wait().await.expect("Indexing failed");
        }
        response.list
    }
}

pub fn admin() -> CallerContext {
    CallerContext::user("admin-user").with_role("ROLE_ADMIN")
}
