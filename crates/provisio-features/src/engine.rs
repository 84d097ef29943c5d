//! Provisioning engine
//!
//! Turns install and uninstall requests into artifact loader calls and
//! state records. Each feature of a plan is handled under its own identity
//! lock: re-check the installed state, apply the artifacts, record the
//! feature, release the lock. Only one identity lock is held at a time, so
//! plans that overlap (even through dependency cycles) cannot deadlock.
//!
//! Artifacts are recorded as soon as the loader applies them. A failure
//! stops the plan but keeps what was already recorded; re-running the same
//! request picks up where it stopped.
//!
//! Artifacts may be shared between features, so loading an artifact and
//! recording its reference, or releasing a reference and removing the
//! artifact, happen under a single artifact lock. No identity lock is taken
//! while it is held. Released artifacts are recorded pending
//! removal until the loader confirms them gone; leftovers are retried at
//! start and on every uninstall.

use provisio_core::types::{
    ArtifactHandle, ArtifactRef, Feature, FeatureId, FeatureIndex, FeatureStatus,
};
use provisio_core::{Error, Result, VersionConstraint};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::resolver::{DependencyResolver, DroppedDependency, FeatureRequest};
use crate::state::StateTracker;
use crate::traits::{ArtifactLoader, CatalogProvider, StateStore};

/// Outcome of an install call
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Features installed by this call, dependencies first
    pub installed: Vec<FeatureId>,

    /// Features that were already installed
    pub skipped: Vec<FeatureId>,

    /// Artifacts handed to the refresh, in order
    pub refreshed: Vec<ArtifactHandle>,

    /// Optional dependencies dropped during resolution
    pub dropped: Vec<DroppedDependency>,
}

impl InstallReport {
    /// Whether the call changed nothing
    pub fn is_noop(&self) -> bool {
        self.installed.is_empty()
    }
}

/// Outcome of an uninstall call
#[derive(Debug, Clone)]
pub struct UninstallReport {
    /// Feature removed
    pub feature: FeatureId,

    /// Artifacts physically removed (reference count reached zero)
    pub removed: Vec<ArtifactHandle>,

    /// Artifacts kept because other features still hold them
    pub retained: Vec<ArtifactHandle>,
}

/// Feature recorded installed whose artifacts are gone from the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftedFeature {
    pub feature: FeatureId,
    pub missing: Vec<ArtifactHandle>,
}

/// Result of comparing recorded state with the live runtime
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    /// Features left `installing` by an interrupted plan
    pub incomplete: Vec<FeatureId>,

    /// Installed features with missing artifacts
    pub drifted: Vec<DriftedFeature>,

    /// Why persisted state could not be loaded, if it could not
    pub state_error: Option<String>,

    /// Unreferenced artifacts the loader still failed to remove
    pub stranded: Vec<ArtifactHandle>,
}

impl DriftReport {
    /// Whether state loaded and matches the runtime
    pub fn is_clean(&self) -> bool {
        self.incomplete.is_empty()
            && self.drifted.is_empty()
            && self.stranded.is_empty()
            && self.state_error.is_none()
    }
}

/// Lock table keyed by feature identity
#[derive(Default)]
struct FeatureLocks {
    locks: Mutex<HashMap<FeatureId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FeatureLocks {
    fn get(&self, id: &FeatureId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }
}

/// Orchestrates resolution, artifact loading and state recording
pub struct ProvisioningEngine {
    catalog: Arc<dyn CatalogProvider>,
    loader: Arc<dyn ArtifactLoader>,
    tracker: StateTracker,
    locks: FeatureLocks,
    artifact_lock: tokio::sync::Mutex<()>,
}

impl ProvisioningEngine {
    /// Create an engine; call [`ProvisioningEngine::start`] before use to load state
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        loader: Arc<dyn ArtifactLoader>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            catalog,
            loader,
            tracker: StateTracker::new(store),
            locks: FeatureLocks::default(),
            artifact_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load persisted state and check it against the runtime
    ///
    /// Unreadable state is logged and replaced by empty state; drift is
    /// logged and reported, never fatal.
    pub async fn start(&self) -> DriftReport {
        let state_error = match self.tracker.load() {
            Ok(state) => {
                info!(
                    "Loaded installation state: {} features recorded",
                    state.features.len()
                );
                None
            }
            Err(e) => {
                warn!(
                    "Could not load installation state from {}: {}; continuing with empty state",
                    self.tracker.location(),
                    e
                );
                Some(e.to_string())
            }
        };

        self.remove_stranded_artifacts().await;

        let mut report = self.reconcile().await;
        report.state_error = state_error;
        report
    }

    /// Compare recorded features with what the loader reports present
    pub async fn reconcile(&self) -> DriftReport {
        let mut report = DriftReport::default();

        for (id, record) in self.tracker.snapshot().features {
            if record.status == FeatureStatus::Installing {
                warn!(
                    "Feature {} was not completely installed; install it again to finish",
                    id
                );
                report.incomplete.push(id);
                continue;
            }

            let mut missing = Vec::new();
            for handle in &record.artifacts {
                if !self.loader.is_installed(handle).await {
                    missing.push(handle.clone());
                }
            }
            if !missing.is_empty() {
                warn!(
                    "Feature {} is recorded installed but {} artifact(s) are missing: {}",
                    id,
                    missing.len(),
                    join(&missing)
                );
                report.drifted.push(DriftedFeature {
                    feature: id,
                    missing,
                });
            }
        }

        report.stranded = self.tracker.pending_removals();
        if !report.stranded.is_empty() {
            warn!(
                "{} artifact(s) are no longer used but could not be removed: {}",
                report.stranded.len(),
                join(&report.stranded)
            );
        }
        report
    }

    /// Retry removing artifacts an earlier uninstall could not remove
    ///
    /// Failures are logged and the artifacts stay pending. Returns the
    /// artifacts removed by this call.
    pub async fn remove_stranded_artifacts(&self) -> Vec<ArtifactHandle> {
        let guard = self.artifact_lock.lock().await;
        let pending = self.tracker.pending_removals();
        if pending.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        for handle in pending {
            match self.loader.uninstall(&handle).await {
                Ok(()) => removed.push(handle),
                Err(e) => warn!("Artifact {} is still pending removal: {:#}", handle, e),
            }
        }
        if removed.is_empty() {
            return removed;
        }

        if let Err(e) = self.tracker.clear_pending_removal(&removed) {
            warn!("Failed to record removal of {}: {}", join(&removed), e);
        }
        drop(guard);

        info!("Removed {} stranded artifact(s): {}", removed.len(), join(&removed));
        if let Err(e) = self.refresh(&removed).await {
            warn!("{}", e);
        }
        removed
    }

    /// Install a feature and its dependencies
    pub async fn install_feature(
        &self,
        name: &str,
        version: &VersionConstraint,
    ) -> Result<InstallReport> {
        self.install_features(&[FeatureRequest::new(name).with_version(version.clone())])
            .await
    }

    /// Install several features as one plan
    pub async fn install_features(&self, requests: &[FeatureRequest]) -> Result<InstallReport> {
        let index = self.catalog.features();
        let plan = DependencyResolver::new(&index)
            .with_installed(self.tracker.installed_features())
            .resolve(requests)?;

        let mut report = InstallReport {
            skipped: plan.skipped.clone(),
            dropped: plan.dropped.clone(),
            ..Default::default()
        };

        // Locators applied by this plan; shared artifacts load once
        let mut applied: HashMap<String, ArtifactHandle> = HashMap::new();
        let mut affected: Vec<ArtifactHandle> = Vec::new();

        for feature in &plan.install_order {
            let id = feature.id();
            let lock = self.locks.get(&id);
            let _guard = lock.lock().await;

            // Another caller may have finished it while we waited
            if self.tracker.is_installed(&id) {
                debug!("Feature {} already installed, skipping", id);
                report.skipped.push(id);
                continue;
            }

            info!("Installing feature {}", id);
            let handles = self.apply_feature(feature, &id, &mut applied).await?;
            self.tracker.record_install(&id, handles.clone())?;

            for handle in handles {
                if !affected.contains(&handle) {
                    affected.push(handle);
                }
            }
            report.installed.push(id);
        }

        if report.installed.is_empty() {
            debug!("Nothing to install");
            return Ok(report);
        }

        self.refresh(&affected).await?;
        report.refreshed = affected;

        info!(
            "Installed {} feature(s): {}",
            report.installed.len(),
            join(&report.installed)
        );
        Ok(report)
    }

    async fn apply_feature(
        &self,
        feature: &Feature,
        id: &FeatureId,
        applied: &mut HashMap<String, ArtifactHandle>,
    ) -> Result<Vec<ArtifactHandle>> {
        let mut handles = Vec::with_capacity(feature.artifacts.len());

        for artifact in &feature.artifacts {
            let _guard = self.artifact_lock.lock().await;

            // Reuse a handle from earlier in the plan only while it is still referenced
            let reusable = applied
                .get(&artifact.locator)
                .filter(|handle| self.tracker.reference_count(handle) > 0)
                .cloned();
            let handle = match reusable {
                Some(handle) => handle,
                None => {
                    let request = ArtifactRef {
                        locator: artifact.locator.clone(),
                        start_level: feature.start_level_for(artifact),
                    };
                    debug!("Loading artifact {} for {}", request.locator, id);
                    let handle = self
                        .loader
                        .install_or_update(&request)
                        .await
                        .map_err(|e| {
                            Error::artifact_load(
                                id.to_string(),
                                &artifact.locator,
                                format!("{:#}", e),
                            )
                        })?;
                    applied.insert(artifact.locator.clone(), handle.clone());
                    handle
                }
            };

            self.tracker.record_artifact(id, handle.clone())?;
            handles.push(handle);
        }

        Ok(handles)
    }

    /// Uninstall one installed feature
    ///
    /// The default constraint picks the only recorded version of `name`.
    /// Dependencies stay installed. Artifacts left over by earlier failed
    /// removals are retried first.
    pub async fn uninstall_feature(
        &self,
        name: &str,
        version: &VersionConstraint,
    ) -> Result<UninstallReport> {
        self.remove_stranded_artifacts().await;

        let id = self.recorded_feature(name, version)?;

        let lock = self.locks.get(&id);
        let _guard = lock.lock().await;

        // Removed by a concurrent call while we waited
        if !self.tracker.snapshot().features.contains_key(&id) {
            return Err(Error::not_installed(name, version.as_str()));
        }

        let artifacts = self.artifact_lock.lock().await;
        let held = self.tracker.artifacts_of(&id);

        info!("Uninstalling feature {}", id);
        let released = self.tracker.record_uninstall(&id)?;
        let retained: Vec<ArtifactHandle> = held
            .into_iter()
            .filter(|h| !released.contains(h))
            .collect();

        let mut removed = Vec::with_capacity(released.len());
        let mut first_failure = None;
        for handle in &released {
            debug!("Removing artifact {}", handle);
            match self.loader.uninstall(handle).await {
                Ok(()) => removed.push(handle.clone()),
                Err(e) => {
                    warn!("Failed to remove artifact {}, will retry: {:#}", handle, e);
                    if first_failure.is_none() {
                        first_failure =
                            Some(Error::artifact_unload(handle.as_str(), format!("{:#}", e)));
                    }
                }
            }
        }
        self.tracker.clear_pending_removal(&removed)?;
        drop(artifacts);

        self.refresh(&released).await?;
        if let Some(error) = first_failure {
            return Err(error);
        }

        if !retained.is_empty() {
            debug!(
                "Kept {} artifact(s) still held by other features: {}",
                retained.len(),
                join(&retained)
            );
        }

        Ok(UninstallReport {
            feature: id,
            removed,
            retained,
        })
    }

    fn recorded_feature(&self, name: &str, version: &VersionConstraint) -> Result<FeatureId> {
        let candidates: Vec<FeatureId> = self
            .tracker
            .snapshot()
            .features
            .into_keys()
            .filter(|id| id.name == name && version.matches(&id.version))
            .collect();

        match candidates.as_slice() {
            [] => Err(Error::not_installed(name, version.as_str())),
            [only] => Ok(only.clone()),
            many => {
                let versions: Vec<String> = many.iter().map(|id| id.version.clone()).collect();
                Err(Error::ambiguous_uninstall(name, &versions))
            }
        }
    }

    async fn refresh(&self, handles: &[ArtifactHandle]) -> Result<()> {
        debug!("Refreshing {} artifact(s)", handles.len());
        self.loader
            .refresh(handles)
            .await
            .map_err(|e| Error::refresh(handles.len(), format!("{:#}", e)))
    }

    /// Fully installed features
    pub fn list_installed(&self) -> Vec<FeatureId> {
        self.tracker.installed_features()
    }

    /// Whether a version of `name` matching `version` is installed
    pub fn is_installed(&self, name: &str, version: &VersionConstraint) -> bool {
        self.tracker
            .installed_features()
            .iter()
            .any(|id| id.name == name && version.matches(&id.version))
    }

    /// Catalog lookup
    pub fn feature(&self, name: &str, version: &VersionConstraint) -> Option<Arc<Feature>> {
        self.catalog.features().select(name, version)
    }

    /// Snapshot of the catalog
    pub fn features(&self) -> Arc<FeatureIndex> {
        self.catalog.features()
    }

    /// Installation state tracker
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use async_trait::async_trait;

    #[derive(Default)]
    struct CountingLoader {
        loads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArtifactLoader for CountingLoader {
        async fn install_or_update(&self, artifact: &ArtifactRef) -> anyhow::Result<ArtifactHandle> {
            self.loads.lock().unwrap().push(artifact.locator.clone());
            Ok(ArtifactHandle::new(artifact.locator.clone()))
        }

        async fn uninstall(&self, _handle: &ArtifactHandle) -> anyhow::Result<()> {
            Ok(())
        }

        async fn refresh(&self, _handles: &[ArtifactHandle]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn is_installed(&self, _handle: &ArtifactHandle) -> bool {
            true
        }
    }

    fn engine(features: Vec<Feature>) -> (ProvisioningEngine, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader::default());
        let engine = ProvisioningEngine::new(
            Arc::new(FeatureIndex::from_features(features)),
            loader.clone(),
            Arc::new(MemoryStateStore::new()),
        );
        (engine, loader)
    }

    fn feature(name: &str, version: &str, artifacts: &[&str]) -> Feature {
        let mut f = Feature::new(name, version);
        f.artifacts = artifacts.iter().map(|a| ArtifactRef::new(*a)).collect();
        f
    }

    #[tokio::test]
    async fn test_feature_without_artifacts_is_recorded() {
        let (engine, loader) = engine(vec![feature("empty", "1.0.0", &[])]);
        let report = engine
            .install_feature("empty", &VersionConstraint::highest())
            .await
            .unwrap();

        assert_eq!(report.installed, vec![FeatureId::new("empty", "1.0.0")]);
        assert!(report.refreshed.is_empty());
        assert!(loader.loads.lock().unwrap().is_empty());
        assert!(engine.is_installed("empty", &VersionConstraint::highest()));
    }

    #[tokio::test]
    async fn test_ambiguous_uninstall() {
        let (engine, _) = engine(vec![
            feature("x", "1.0.0", &["x1.jar"]),
            feature("x", "2.0.0", &["x2.jar"]),
        ]);
        engine
            .install_feature("x", &VersionConstraint::parse("1.0.0"))
            .await
            .unwrap();
        engine
            .install_feature("x", &VersionConstraint::parse("2.0.0"))
            .await
            .unwrap();

        let err = engine
            .uninstall_feature("x", &VersionConstraint::highest())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousUninstall { .. }));

        let report = engine
            .uninstall_feature("x", &VersionConstraint::parse("1.0.0"))
            .await
            .unwrap();
        assert_eq!(report.feature, FeatureId::new("x", "1.0.0"));
        assert_eq!(report.removed, vec![ArtifactHandle::new("x1.jar")]);
    }

    #[tokio::test]
    async fn test_uninstall_not_installed() {
        let (engine, _) = engine(vec![feature("x", "1.0.0", &["x.jar"])]);
        let err = engine
            .uninstall_feature("x", &VersionConstraint::highest())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInstalled { .. }));
    }

    #[tokio::test]
    async fn test_feature_lookup() {
        let (engine, _) = engine(vec![
            feature("x", "1.0.0", &[]),
            feature("x", "2.0.0", &[]),
        ]);
        let found = engine.feature("x", &VersionConstraint::highest()).unwrap();
        assert_eq!(found.version, "2.0.0");
        assert!(engine.feature("y", &VersionConstraint::highest()).is_none());
    }
}
