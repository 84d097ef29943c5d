//! Feature catalog
//!
//! Holds the repositories loaded from a [`CatalogSource`] and the feature
//! index derived from them. Repositories may reference other repositories;
//! those are loaded along with their parent and dropped again once no
//! registered repository reaches them anymore.
//!
//! The index is rebuilt on every mutation and handed out as an immutable
//! `Arc<FeatureIndex>` snapshot.

use provisio_core::types::{FeatureIndex, Repository};
use provisio_core::{Error, Result};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::traits::{CatalogProvider, CatalogSource};

/// Outcome of loading several repositories
#[derive(Debug, Default)]
pub struct LoadReport {
    /// URIs loaded by this call, including referenced repositories
    pub loaded: Vec<String>,

    /// URIs that failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl LoadReport {
    /// Whether every repository loaded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

struct CatalogInner {
    /// Loaded repositories, in load order
    repositories: Vec<Repository>,

    /// URIs registered directly (not only pulled in by reference)
    registered: BTreeSet<String>,

    /// Derived feature index
    index: Arc<FeatureIndex>,
}

impl CatalogInner {
    fn contains(&self, uri: &str) -> bool {
        self.repositories.iter().any(|r| r.uri == uri)
    }

    fn rebuild_index(&mut self) {
        let mut index = FeatureIndex::new();
        for repository in &self.repositories {
            for feature in repository.features() {
                if !index.insert(feature.clone()) {
                    warn!(
                        "Feature {} from repository {} is already defined; keeping the first definition",
                        feature.id(),
                        repository.uri
                    );
                }
            }
        }
        debug!(
            "Rebuilt feature index: {} features from {} repositories",
            index.len(),
            self.repositories.len()
        );
        self.index = Arc::new(index);
    }

    /// URIs reachable from the registered repositories
    fn reachable(&self) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut queue: VecDeque<String> = self.registered.iter().cloned().collect();
        while let Some(uri) = queue.pop_front() {
            if !reachable.insert(uri.clone()) {
                continue;
            }
            if let Some(repository) = self.repositories.iter().find(|r| r.uri == uri) {
                queue.extend(repository.repositories().iter().cloned());
            }
        }
        reachable
    }
}

/// In-memory catalog of features built from repository descriptors
pub struct Catalog {
    source: Arc<dyn CatalogSource>,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Create an empty catalog reading descriptors from `source`
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            inner: RwLock::new(CatalogInner {
                repositories: Vec::new(),
                registered: BTreeSet::new(),
                index: Arc::new(FeatureIndex::new()),
            }),
        }
    }

    /// Load several repositories, tolerating individual failures
    pub async fn load_all<I, S>(&self, uris: I) -> LoadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = LoadReport::default();
        for uri in uris {
            let uri = uri.as_ref();
            match self.add_repository(uri).await {
                Ok(loaded) => report.loaded.extend(loaded),
                Err(e) => {
                    warn!("Skipping repository {}: {}", uri, e);
                    report.failed.push((uri.to_string(), e.to_string()));
                }
            }
        }
        report
    }

    /// Load a single repository
    pub async fn load(&self, uri: &str) -> Result<Vec<String>> {
        self.add_repository(uri).await
    }

    /// Register a repository and everything it references
    ///
    /// Re-adding a loaded URI is a no-op. A failure fetching the repository
    /// itself is returned; failures in referenced repositories are logged
    /// and skipped. Returns the URIs newly loaded.
    pub async fn add_repository(&self, uri: &str) -> Result<Vec<String>> {
        if self.mark_registered_if_loaded(uri) {
            debug!("Repository {} already loaded", uri);
            return Ok(Vec::new());
        }

        // Fetch outside the lock; the source may do I/O
        let mut fetched = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([uri.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) || (current != uri && self.contains(&current)) {
                continue;
            }

            let mut descriptor = match self.source.fetch(&current).await {
                Ok(descriptor) => descriptor,
                Err(e) if current == uri => {
                    return Err(Error::repository(uri, format!("{:#}", e)));
                }
                Err(e) => {
                    warn!(
                        "Failed to load repository {} referenced from {}: {:#}",
                        current, uri, e
                    );
                    continue;
                }
            };

            descriptor.repositories = descriptor
                .repositories
                .iter()
                .map(|reference| self.source.resolve_reference(&current, reference))
                .collect();
            queue.extend(descriptor.repositories.iter().cloned());

            fetched.push(Repository {
                uri: current,
                descriptor,
            });
        }

        let mut inner = self.write();
        let mut loaded = Vec::new();
        for repository in fetched {
            if inner.contains(&repository.uri) {
                continue;
            }
            info!(
                "Loaded repository {} ({} features) from {}",
                repository.name(),
                repository.features().len(),
                repository.uri
            );
            loaded.push(repository.uri.clone());
            inner.repositories.push(repository);
        }
        inner.registered.insert(uri.to_string());
        inner.rebuild_index();

        Ok(loaded)
    }

    /// Unregister a repository
    ///
    /// Drops the repository and any referenced repository no longer
    /// reachable from another registered one. Returns the URIs removed.
    pub fn remove_repository(&self, uri: &str) -> Vec<String> {
        let mut inner = self.write();
        if !inner.registered.remove(uri) {
            if inner.contains(uri) {
                warn!(
                    "Repository {} is only referenced by other repositories; not removing",
                    uri
                );
            } else {
                debug!("Repository {} is not loaded", uri);
            }
            return Vec::new();
        }

        let reachable = inner.reachable();
        let mut removed = Vec::new();
        inner.repositories.retain(|repository| {
            let keep = reachable.contains(&repository.uri);
            if !keep {
                removed.push(repository.uri.clone());
            }
            keep
        });

        for gone in &removed {
            info!("Removed repository {}", gone);
        }
        inner.rebuild_index();
        removed
    }

    /// Whether a repository is loaded (registered or referenced)
    pub fn contains(&self, uri: &str) -> bool {
        self.read().contains(uri)
    }

    /// Loaded repositories, in load order
    pub fn repositories(&self) -> Vec<Repository> {
        self.read().repositories.clone()
    }

    /// Repository by URI
    pub fn repository(&self, uri: &str) -> Option<Repository> {
        self.read()
            .repositories
            .iter()
            .find(|r| r.uri == uri)
            .cloned()
    }

    /// URIs registered directly
    pub fn registered(&self) -> Vec<String> {
        self.read().registered.iter().cloned().collect()
    }

    /// Artifact repository URIs declared by loaded repositories
    pub fn artifact_repositories(&self) -> Vec<String> {
        let inner = self.read();
        let mut seen = HashSet::new();
        inner
            .repositories
            .iter()
            .flat_map(|r| r.descriptor.artifact_repositories.iter())
            .filter(|uri| seen.insert(uri.as_str()))
            .cloned()
            .collect()
    }

    /// All known features: name -> version -> feature
    pub fn all_features(&self) -> Arc<FeatureIndex> {
        Arc::clone(&self.read().index)
    }

    fn mark_registered_if_loaded(&self, uri: &str) -> bool {
        let mut inner = self.write();
        if inner.contains(uri) {
            inner.registered.insert(uri.to_string());
            true
        } else {
            false
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CatalogInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CatalogProvider for Catalog {
    fn features(&self) -> Arc<FeatureIndex> {
        self.all_features()
    }
}
