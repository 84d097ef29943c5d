//! Installation state types
//!
//! Persisted as JSON:
//! ```json
//! {
//!   "schema_version": "1.0",
//!   "last_updated": "2026-01-21T10:00:00Z",
//!   "repositories": ["file:///opt/platform/features.yaml"],
//!   "features": {
//!     "ssh/1.0.0": {
//!       "status": "installed",
//!       "artifacts": ["sshd.jar"],
//!       "installed_at": "2026-01-20T15:30:00Z"
//!     }
//!   },
//!   "artifacts": { "sshd.jar": 1 },
//!   "pending_removal": ["web.jar"]
//! }
//! ```

use super::feature_types::FeatureId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Current state file schema version
pub const STATE_SCHEMA_VERSION: &str = "1.0";

/// Handle identifying an artifact on the live runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(pub String);

impl ArtifactHandle {
    /// Create a handle
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Handle as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Installation status of a recorded feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    /// Some artifacts applied; the feature itself is not complete
    Installing,
    /// All artifacts applied and recorded
    Installed,
}

/// Recorded feature entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFeature {
    /// Current status
    pub status: FeatureStatus,

    /// Artifacts held by this feature, in install order
    #[serde(default)]
    pub artifacts: Vec<ArtifactHandle>,

    /// When the entry was last written
    pub installed_at: DateTime<Utc>,
}

/// Durable installation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    /// Schema version of the persisted document
    pub schema_version: String,

    /// Last mutation time
    pub last_updated: DateTime<Utc>,

    /// Registered repository URIs
    #[serde(default)]
    pub repositories: BTreeSet<String>,

    /// Recorded features
    #[serde(default)]
    pub features: BTreeMap<FeatureId, InstalledFeature>,

    /// Reference counts, derived from `features`
    #[serde(default)]
    pub artifacts: BTreeMap<ArtifactHandle, usize>,

    /// Unreferenced artifacts the loader has not confirmed removed yet
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending_removal: BTreeSet<ArtifactHandle>,
}

impl Default for InstallationState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
            repositories: BTreeSet::new(),
            features: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            pending_removal: BTreeSet::new(),
        }
    }
}

impl InstallationState {
    /// Whether a feature is fully installed
    pub fn is_installed(&self, id: &FeatureId) -> bool {
        self.features
            .get(id)
            .map(|f| f.status == FeatureStatus::Installed)
            .unwrap_or(false)
    }

    /// Number of recorded features holding an artifact
    pub fn reference_count(&self, handle: &ArtifactHandle) -> usize {
        self.artifacts.get(handle).copied().unwrap_or(0)
    }

    /// Fully installed feature identities
    pub fn installed_features(&self) -> Vec<FeatureId> {
        self.features
            .iter()
            .filter(|(_, f)| f.status == FeatureStatus::Installed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Rebuild reference counts from the recorded features
    ///
    /// Counts are a pure function of the feature records; each feature
    /// counts once per distinct artifact it holds. An artifact referenced
    /// again is no longer pending removal.
    pub fn recompute_references(&mut self) {
        let mut counts: BTreeMap<ArtifactHandle, usize> = BTreeMap::new();
        for feature in self.features.values() {
            let distinct: BTreeSet<&ArtifactHandle> = feature.artifacts.iter().collect();
            for handle in distinct {
                *counts.entry(handle.clone()).or_insert(0) += 1;
            }
        }
        self.pending_removal.retain(|h| !counts.contains_key(h));
        self.artifacts = counts;
    }
}
