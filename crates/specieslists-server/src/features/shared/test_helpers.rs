//! Test fixtures for feature and pipeline tests
//!
//! [`TestHarness`] wires a [`FeatureState`] over the in-memory store, the
//! in-memory index, a scripted name resolver and a temporary release
//! directory.
//!
//! # Examples
//!
//! ```rust,ignore
//! use specieslists_server::features::shared::test_helpers::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarness::new();
//!     harness.resolver.add_match("Vulpes vulpes", "urn:fox");
//!     let list = harness.list("Foxes", "user-1").await;
//!     // ... test logic ...
//! }
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::config::PipelineSettings;
use crate::db::{CanonicalStore, MemoryStore};
use crate::features::{Backends, FeatureState};
use crate::index::MemoryIndex;
use crate::matching::{NameQuery, NameResolver, ResolveError};
use crate::models::{Classification, ListMetadata, ListType, SpeciesList};
use crate::search::RolePolicy;
use crate::storage::LocalArtifactStore;

/// Name resolver answering from a fixed table
#[derive(Default)]
pub struct StaticResolver {
    matches: Mutex<HashMap<String, Classification>>,
    failures: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn add_match(&self, name: &str, concept: &str) {
        let classification = Classification {
            success: true,
            scientific_name: Some(name.to_string()),
            taxon_concept_id: Some(concept.to_string()),
            rank: Some("species".to_string()),
            match_type: Some("exactMatch".to_string()),
            ..Default::default()
        };
        self.add_classification(name, classification);
    }

    pub fn add_classification(&self, name: &str, classification: Classification) {
        self.matches.lock().unwrap().insert(name.to_string(), classification);
    }

    /// Make lookups of `name` fail as if the service were down
    pub fn add_failure(&self, name: &str) {
        self.failures.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve(&self, query: &NameQuery) -> Result<Classification, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.lock().unwrap().contains(&query.scientific_name) {
            return Err(ResolveError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self
            .matches
            .lock()
            .unwrap()
            .get(&query.scientific_name)
            .cloned()
            .unwrap_or_else(|| Classification::unmatched(vec!["noMatch".to_string()])))
    }
}

pub struct TestHarness {
    pub state: FeatureState,
    pub store: Arc<MemoryStore>,
    pub index: Arc<MemoryIndex>,
    pub resolver: Arc<StaticResolver>,
    pub release_dir: TempDir,
}

impl TestHarness {
    /// Must be called from inside a tokio runtime
    pub fn new() -> Self {
        Self::with_settings(PipelineSettings::default())
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self::with_settings(PipelineSettings {
            page_size,
            bulk_batch_size: page_size,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new(settings.max_result_window));
        let resolver = Arc::new(StaticResolver::default());
        let release_dir = tempfile::tempdir().unwrap();

        let backends = Backends {
            store: store.clone(),
            index: index.clone(),
            resolver: resolver.clone(),
            artifacts: Arc::new(LocalArtifactStore::new(release_dir.path())),
            policy: Arc::new(RolePolicy::default()),
        };
        let state = FeatureState::new(backends, settings).unwrap();

        Self {
            state,
            store,
            index,
            resolver,
            release_dir,
        }
    }

    /// Insert an empty public list
    pub async fn list(&self, title: &str, owner: &str) -> SpeciesList {
        let list = SpeciesList::new(ListMetadata::new(title, ListType::LocalList), owner);
        self.store.insert_list(&list).await.unwrap();
        list
    }

    /// Insert an empty private list
    pub async fn private_list(&self, title: &str, owner: &str) -> SpeciesList {
        let mut metadata = ListMetadata::new(title, ListType::LocalList);
        metadata.is_private = true;
        let list = SpeciesList::new(metadata, owner);
        self.store.insert_list(&list).await.unwrap();
        list
    }
}
