//! Capability traits the provisioning core depends on
//!
//! Every external collaborator is handed to the core explicitly at
//! construction time. Tests substitute in-memory fakes for each of them.

use async_trait::async_trait;
use provisio_core::types::{
    ArtifactHandle, ArtifactRef, FeatureIndex, InstallationState, RepositoryDescriptor,
};
use std::sync::Arc;

/// Source of repository descriptors
///
/// Fetching and parsing happen here; a failure affects only the repository
/// being fetched.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch and parse the descriptor at `uri`
    async fn fetch(&self, uri: &str) -> anyhow::Result<RepositoryDescriptor>;

    /// Resolve a repository reference found inside the descriptor at `base`
    ///
    /// The default keeps the reference as written.
    fn resolve_reference(&self, base: &str, reference: &str) -> String {
        let _ = base;
        reference.to_string()
    }
}

/// Provider of the current feature map
///
/// Deriving the map may be expensive; callers take one snapshot per
/// operation.
pub trait CatalogProvider: Send + Sync {
    /// Snapshot of all known features
    fn features(&self) -> Arc<FeatureIndex>;
}

impl CatalogProvider for FeatureIndex {
    fn features(&self) -> Arc<FeatureIndex> {
        Arc::new(self.clone())
    }
}

impl CatalogProvider for Arc<FeatureIndex> {
    fn features(&self) -> Arc<FeatureIndex> {
        Arc::clone(self)
    }
}

/// Loader that materializes artifacts on the live runtime
#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    /// Install the artifact, or update it if already present
    async fn install_or_update(&self, artifact: &ArtifactRef) -> anyhow::Result<ArtifactHandle>;

    /// Physically remove an artifact
    async fn uninstall(&self, handle: &ArtifactHandle) -> anyhow::Result<()>;

    /// Refresh the given artifacts, in the given order
    async fn refresh(&self, handles: &[ArtifactHandle]) -> anyhow::Result<()>;

    /// Whether the artifact is present on the runtime
    async fn is_installed(&self, handle: &ArtifactHandle) -> bool;
}

/// Durable storage for installation state
pub trait StateStore: Send + Sync {
    /// Load the persisted state; `None` when nothing was persisted yet
    fn load(&self) -> provisio_core::Result<Option<InstallationState>>;

    /// Replace the persisted state atomically
    fn save(&self, state: &InstallationState) -> provisio_core::Result<()>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}
