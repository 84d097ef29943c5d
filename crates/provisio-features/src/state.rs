//! Installation state tracking
//!
//! The tracker owns the in-memory [`InstallationState`] and writes it
//! through a [`StateStore`] on every mutation. A mutation is applied to a
//! copy first; the copy replaces the live state only after it has been
//! saved, so a failed save leaves both the file and memory unchanged.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use fs4::fs_std::FileExt;
use provisio_core::types::{
    ArtifactHandle, FeatureId, FeatureStatus, InstallationState, InstalledFeature,
};
use provisio_core::{Error, Result};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::traits::StateStore;

/// JSON file store with atomic replace
pub struct FileStateStore {
    path: Utf8PathBuf,
}

impl FileStateStore {
    /// Store state at `path`
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn lock_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.lock", self.path))
    }

    fn io_error(&self, e: impl std::fmt::Display) -> Error {
        Error::state_io(self.path.as_str(), e.to_string())
    }
}

/// Run blocking file work, letting a multi-thread runtime move other tasks off this worker
fn blocking<T>(work: impl FnOnce() -> T) -> T {
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

impl FileStateStore {
    fn read(&self) -> Result<Option<InstallationState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let mut state: InstallationState =
            serde_json::from_str(&content).map_err(|e| self.io_error(e))?;
        state.recompute_references();
        Ok(Some(state))
    }

    fn write(&self, state: &InstallationState) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_str().is_empty() => p.to_owned(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| self.io_error(e))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;

        // Released when `lock` is dropped
        lock.lock_exclusive().map_err(|e| self.io_error(e))?;

        let json = serde_json::to_string_pretty(state).map_err(|e| self.io_error(e))?;
        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| self.io_error(e))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        debug!("Saved installation state to {}", self.path);
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<InstallationState>> {
        blocking(|| self.read())
    }

    fn save(&self, state: &InstallationState) -> Result<()> {
        blocking(|| self.write(state))
    }

    fn location(&self) -> String {
        self.path.to_string()
    }
}

/// In-memory store, mostly for tests and dry runs
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<InstallationState>>,
}

impl MemoryStateStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a state
    pub fn with_state(state: InstallationState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved state
    pub fn saved(&self) -> Option<InstallationState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<InstallationState>> {
        Ok(self.saved())
    }

    fn save(&self, state: &InstallationState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Durable record of installed features and artifact references
pub struct StateTracker {
    store: Arc<dyn StateStore>,
    state: Mutex<InstallationState>,
}

impl StateTracker {
    /// Create a tracker with empty state; call [`StateTracker::load`] to read the store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            state: Mutex::new(InstallationState::default()),
        }
    }

    /// Replace the in-memory state with the persisted one
    ///
    /// Nothing persisted yet loads as empty state. On error the in-memory
    /// state is left untouched.
    pub fn load(&self) -> Result<InstallationState> {
        let loaded = self.store.load()?.unwrap_or_default();
        debug!(
            "Loaded installation state from {} ({} features)",
            self.store.location(),
            loaded.features.len()
        );
        *self.lock() = loaded.clone();
        Ok(loaded)
    }

    /// Persist the current state
    pub fn save(&self) -> Result<()> {
        let state = self.lock();
        self.store.save(&state)
    }

    /// Store location, for logs
    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Whether a feature is fully installed
    pub fn is_installed(&self, id: &FeatureId) -> bool {
        self.lock().is_installed(id)
    }

    /// Record one applied artifact; the feature stays `installing`
    pub fn record_artifact(&self, id: &FeatureId, handle: ArtifactHandle) -> Result<()> {
        self.mutate(|state| {
            let entry = state
                .features
                .entry(id.clone())
                .or_insert_with(|| InstalledFeature {
                    status: FeatureStatus::Installing,
                    artifacts: Vec::new(),
                    installed_at: Utc::now(),
                });
            if !entry.artifacts.contains(&handle) {
                entry.artifacts.push(handle);
            }
        })
    }

    /// Mark a feature installed with the given artifacts
    pub fn record_install(&self, id: &FeatureId, handles: Vec<ArtifactHandle>) -> Result<()> {
        self.mutate(|state| {
            let mut artifacts = state
                .features
                .remove(id)
                .map(|f| f.artifacts)
                .unwrap_or_default();
            for handle in handles {
                if !artifacts.contains(&handle) {
                    artifacts.push(handle);
                }
            }
            state.features.insert(
                id.clone(),
                InstalledFeature {
                    status: FeatureStatus::Installed,
                    artifacts,
                    installed_at: Utc::now(),
                },
            );
        })
    }

    /// Drop a feature record
    ///
    /// Returns the artifacts of that feature whose reference count reached
    /// zero, in the feature's install order. They are recorded as pending
    /// removal in the same write and stay so until
    /// [`StateTracker::clear_pending_removal`] confirms them gone.
    pub fn record_uninstall(&self, id: &FeatureId) -> Result<Vec<ArtifactHandle>> {
        let mut released = Vec::new();
        self.mutate(|state| {
            if let Some(removed) = state.features.remove(id) {
                let still_held: BTreeSet<&ArtifactHandle> = state
                    .features
                    .values()
                    .flat_map(|f| f.artifacts.iter())
                    .collect();
                let mut seen = BTreeSet::new();
                released = removed
                    .artifacts
                    .iter()
                    .filter(|h| !still_held.contains(h) && seen.insert(*h))
                    .cloned()
                    .collect();
                state.pending_removal.extend(released.iter().cloned());
            }
        })?;
        Ok(released)
    }

    /// Unreferenced artifacts still waiting for the loader to remove them
    pub fn pending_removals(&self) -> Vec<ArtifactHandle> {
        self.lock().pending_removal.iter().cloned().collect()
    }

    /// Forget artifacts the loader has removed
    pub fn clear_pending_removal(&self, handles: &[ArtifactHandle]) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        self.mutate(|state| {
            for handle in handles {
                state.pending_removal.remove(handle);
            }
        })
    }

    /// Number of recorded features holding an artifact
    pub fn reference_count(&self, handle: &ArtifactHandle) -> usize {
        self.lock().reference_count(handle)
    }

    /// Fully installed features
    pub fn installed_features(&self) -> Vec<FeatureId> {
        self.lock().installed_features()
    }

    /// Artifacts recorded for a feature
    pub fn artifacts_of(&self, id: &FeatureId) -> Vec<ArtifactHandle> {
        self.lock()
            .features
            .get(id)
            .map(|f| f.artifacts.clone())
            .unwrap_or_default()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> InstallationState {
        self.lock().clone()
    }

    /// Registered repository URIs
    pub fn repositories(&self) -> Vec<String> {
        self.lock().repositories.iter().cloned().collect()
    }

    /// Replace the registered repository URIs
    pub fn set_repositories(&self, uris: impl IntoIterator<Item = String>) -> Result<()> {
        let uris: BTreeSet<String> = uris.into_iter().collect();
        self.mutate(|state| state.repositories = uris)
    }

    fn mutate(&self, change: impl FnOnce(&mut InstallationState)) -> Result<()> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        change(&mut next);
        next.recompute_references();
        next.last_updated = Utc::now();
        self.store.save(&next)?;
        *guard = next;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InstallationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn load(&self) -> Result<Option<InstallationState>> {
            Err(Error::state_io("broken", "unreadable"))
        }

        fn save(&self, _state: &InstallationState) -> Result<()> {
            Err(Error::state_io("broken", "read-only"))
        }

        fn location(&self) -> String {
            "broken".to_string()
        }
    }

    fn handles(ids: &[&str]) -> Vec<ArtifactHandle> {
        ids.iter().map(|id| ArtifactHandle::new(*id)).collect()
    }

    fn temp_state_path(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().join("state.json")).unwrap()
    }

    #[test]
    fn test_file_store_missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileStateStore::new(temp_state_path(&temp));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp_state_path(&temp);
        let id = FeatureId::new("ssh", "1.0.0");

        {
            let tracker = StateTracker::new(Arc::new(FileStateStore::new(path.clone())));
            tracker
                .record_install(&id, handles(&["sshd.jar", "shell.jar"]))
                .unwrap();
        }

        let tracker = StateTracker::new(Arc::new(FileStateStore::new(path.clone())));
        assert!(!tracker.is_installed(&id));
        tracker.load().unwrap();
        assert!(tracker.is_installed(&id));
        assert_eq!(tracker.artifacts_of(&id), handles(&["sshd.jar", "shell.jar"]));
        assert!(Utf8PathBuf::from(format!("{}.lock", path)).exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp_state_path(&temp);
        fs::write(&path, "{ not json").unwrap();

        let err = FileStateStore::new(path).load().unwrap_err();
        assert!(matches!(err, Error::StateIo { .. }));
    }

    #[test]
    fn test_record_artifact_then_install() {
        let tracker = StateTracker::new(Arc::new(MemoryStateStore::new()));
        let id = FeatureId::new("a", "1.0.0");

        tracker.record_artifact(&id, ArtifactHandle::new("a.jar")).unwrap();
        assert!(!tracker.is_installed(&id));
        assert_eq!(tracker.reference_count(&ArtifactHandle::new("a.jar")), 1);

        tracker.record_install(&id, handles(&["a.jar", "b.jar"])).unwrap();
        assert!(tracker.is_installed(&id));
        assert_eq!(tracker.artifacts_of(&id), handles(&["a.jar", "b.jar"]));
    }

    #[test]
    fn test_uninstall_releases_unshared_artifacts() {
        let tracker = StateTracker::new(Arc::new(MemoryStateStore::new()));
        let a = FeatureId::new("a", "1.0.0");
        let b = FeatureId::new("b", "1.0.0");
        tracker.record_install(&a, handles(&["z.jar", "a.jar"])).unwrap();
        tracker.record_install(&b, handles(&["z.jar"])).unwrap();
        assert_eq!(tracker.reference_count(&ArtifactHandle::new("z.jar")), 2);

        assert_eq!(tracker.record_uninstall(&a).unwrap(), handles(&["a.jar"]));
        assert_eq!(tracker.reference_count(&ArtifactHandle::new("z.jar")), 1);

        assert_eq!(tracker.record_uninstall(&b).unwrap(), handles(&["z.jar"]));
        assert_eq!(tracker.reference_count(&ArtifactHandle::new("z.jar")), 0);
        assert!(tracker.installed_features().is_empty());
    }

    #[test]
    fn test_released_artifacts_pending_until_cleared() {
        let store = Arc::new(MemoryStateStore::new());
        let tracker = StateTracker::new(store.clone());
        let a = FeatureId::new("a", "1.0.0");
        tracker.record_install(&a, handles(&["z.jar", "a.jar"])).unwrap();

        let released = tracker.record_uninstall(&a).unwrap();
        assert_eq!(tracker.pending_removals(), handles(&["a.jar", "z.jar"]));
        assert_eq!(store.saved().unwrap().pending_removal.len(), 2);

        tracker.clear_pending_removal(&released[..1]).unwrap();
        assert_eq!(tracker.pending_removals(), handles(&["a.jar"]));
    }

    #[test]
    fn test_reinstalled_artifact_no_longer_pending() {
        let tracker = StateTracker::new(Arc::new(MemoryStateStore::new()));
        let a = FeatureId::new("a", "1.0.0");
        let b = FeatureId::new("b", "1.0.0");
        tracker.record_install(&a, handles(&["z.jar"])).unwrap();
        tracker.record_uninstall(&a).unwrap();

        tracker.record_artifact(&b, ArtifactHandle::new("z.jar")).unwrap();
        assert!(tracker.pending_removals().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_store_inside_multi_thread_runtime() {
        let temp = TempDir::new().unwrap();
        let path = temp_state_path(&temp);
        let id = FeatureId::new("ssh", "1.0.0");

        let tracker = StateTracker::new(Arc::new(FileStateStore::new(path.clone())));
        tracker.record_install(&id, handles(&["sshd.jar"])).unwrap();

        let reloaded = StateTracker::new(Arc::new(FileStateStore::new(path)));
        reloaded.load().unwrap();
        assert!(reloaded.is_installed(&id));
    }

    #[test]
    fn test_uninstall_unknown_feature_releases_nothing() {
        let tracker = StateTracker::new(Arc::new(MemoryStateStore::new()));
        assert!(tracker
            .record_uninstall(&FeatureId::new("x", "1.0.0"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_failed_save_keeps_previous_state() {
        let tracker = StateTracker::new(Arc::new(BrokenStore));
        let id = FeatureId::new("a", "1.0.0");

        assert!(tracker.record_install(&id, handles(&["a.jar"])).is_err());
        assert!(!tracker.is_installed(&id));
        assert!(tracker.load().is_err());
    }

    #[test]
    fn test_repositories_round_trip_through_store() {
        let store = Arc::new(MemoryStateStore::new());
        let tracker = StateTracker::new(store.clone());
        tracker
            .set_repositories(vec!["b.yaml".to_string(), "a.yaml".to_string()])
            .unwrap();

        assert_eq!(tracker.repositories(), vec!["a.yaml", "b.yaml"]);
        assert_eq!(store.saved().unwrap().repositories.len(), 2);
    }
}
