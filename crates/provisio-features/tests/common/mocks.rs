//! Mock implementations for testing
//!
//! Provides in-memory stand-ins for the artifact loader and state store so
//! the engine can be exercised without a runtime or filesystem.

#![allow(dead_code)]

use async_trait::async_trait;
use provisio_core::types::{ArtifactHandle, ArtifactRef, InstallationState};
use provisio_core::{Error, Result};
use provisio_features::{ArtifactLoader, StateStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Record of a loader call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoaderCall {
    Install(String),
    Uninstall(String),
    Refresh(Vec<String>),
}

/// Artifact loader that records every call
///
/// The handle for a locator is the locator itself.
#[derive(Clone, Default)]
pub struct RecordingLoader {
    invocations: Arc<Mutex<Vec<LoaderCall>>>,
    present: Arc<Mutex<HashSet<String>>>,
    failing_installs: Arc<Mutex<HashSet<String>>>,
    failing_uninstalls: Arc<Mutex<HashSet<String>>>,
    fail_refresh: Arc<Mutex<bool>>,
    install_delay: Option<Duration>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside every install, to widen race windows
    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = Some(delay);
        self
    }

    /// Make installs of `locator` fail
    pub fn fail_install(&self, locator: &str) {
        self.failing_installs
            .lock()
            .unwrap()
            .insert(locator.to_string());
    }

    /// Make uninstalls of `handle` fail, leaving the artifact in place
    pub fn fail_uninstall(&self, handle: &str) {
        self.failing_uninstalls
            .lock()
            .unwrap()
            .insert(handle.to_string());
    }

    /// Let uninstalls of `handle` succeed again
    pub fn allow_uninstall(&self, handle: &str) {
        self.failing_uninstalls.lock().unwrap().remove(handle);
    }

    /// Make refresh calls fail or succeed
    pub fn fail_refresh(&self, fail: bool) {
        *self.fail_refresh.lock().unwrap() = fail;
    }

    /// Remove an artifact behind the engine's back
    pub fn vanish(&self, locator: &str) {
        self.present.lock().unwrap().remove(locator);
    }

    pub fn invocations(&self) -> Vec<LoaderCall> {
        self.invocations.lock().unwrap().clone()
    }

    /// Locators passed to install_or_update, in call order
    pub fn installs(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter_map(|call| match call {
                LoaderCall::Install(locator) => Some(locator),
                _ => None,
            })
            .collect()
    }

    /// Handles passed to uninstall, in call order
    pub fn uninstalls(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter_map(|call| match call {
                LoaderCall::Uninstall(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Handle lists passed to refresh, in call order
    pub fn refreshes(&self) -> Vec<Vec<String>> {
        self.invocations()
            .into_iter()
            .filter_map(|call| match call {
                LoaderCall::Refresh(handles) => Some(handles),
                _ => None,
            })
            .collect()
    }

    pub fn is_present(&self, locator: &str) -> bool {
        self.present.lock().unwrap().contains(locator)
    }

    fn record(&self, call: LoaderCall) {
        self.invocations.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ArtifactLoader for RecordingLoader {
    async fn install_or_update(&self, artifact: &ArtifactRef) -> anyhow::Result<ArtifactHandle> {
        self.record(LoaderCall::Install(artifact.locator.clone()));
        if let Some(delay) = self.install_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing_installs
            .lock()
            .unwrap()
            .contains(&artifact.locator)
        {
            anyhow::bail!("simulated failure loading {}", artifact.locator);
        }
        self.present
            .lock()
            .unwrap()
            .insert(artifact.locator.clone());
        Ok(ArtifactHandle::new(artifact.locator.clone()))
    }

    async fn uninstall(&self, handle: &ArtifactHandle) -> anyhow::Result<()> {
        self.record(LoaderCall::Uninstall(handle.to_string()));
        if self
            .failing_uninstalls
            .lock()
            .unwrap()
            .contains(handle.as_str())
        {
            anyhow::bail!("{} is busy", handle);
        }
        self.present.lock().unwrap().remove(handle.as_str());
        Ok(())
    }

    async fn refresh(&self, handles: &[ArtifactHandle]) -> anyhow::Result<()> {
        self.record(LoaderCall::Refresh(
            handles.iter().map(|h| h.to_string()).collect(),
        ));
        if *self.fail_refresh.lock().unwrap() {
            anyhow::bail!("simulated refresh failure");
        }
        Ok(())
    }

    async fn is_installed(&self, handle: &ArtifactHandle) -> bool {
        self.is_present(handle.as_str())
    }
}

/// State store whose load always fails, as with a corrupt state file
#[derive(Default)]
pub struct CorruptStore {
    saved: Mutex<Option<InstallationState>>,
}

impl StateStore for CorruptStore {
    fn load(&self) -> Result<Option<InstallationState>> {
        Err(Error::state_io("corrupt.json", "expected value at line 1 column 1"))
    }

    fn save(&self, state: &InstallationState) -> Result<()> {
        *self.saved.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "corrupt.json".to_string()
    }
}
