//! Boot-time feature installation
//!
//! Boot entries use the `name;version=V` form and are usually given as one
//! comma-separated string. Every entry is installed on its own: a failing
//! entry is logged and skipped, and never stops the ones after it.

use provisio_core::types::{FeatureId, InstallMode};
use provisio_core::VersionConstraint;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::ProvisioningEngine;

/// One parsed boot entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootFeature {
    pub name: String,
    pub version: VersionConstraint,
}

impl BootFeature {
    /// Parse a single `name;version=V` entry
    ///
    /// Unknown attributes are ignored; a missing or empty version means the
    /// highest available. Returns `None` for a blank entry.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';').map(str::trim);
        let name = parts.next().filter(|n| !n.is_empty())?;

        let mut version = VersionConstraint::highest();
        for attribute in parts {
            match attribute.split_once('=') {
                Some((key, value)) if key.trim() == "version" => {
                    version = VersionConstraint::parse(value);
                }
                _ => debug!("Ignoring boot attribute '{}' of {}", attribute, name),
            }
        }

        Some(Self {
            name: name.to_string(),
            version,
        })
    }

    /// Split a comma-separated boot string into entries
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',').filter_map(Self::parse).collect()
    }
}

/// A boot entry that could not be installed
#[derive(Debug, Clone)]
pub struct BootFailure {
    /// Entry as given
    pub entry: String,

    /// Error message
    pub error: String,

    /// Whether running boot again may succeed without changing the catalog
    pub retryable: bool,
}

/// Result of a boot run
#[derive(Debug, Default)]
pub struct BootReport {
    /// Entries installed (or already installed), in order
    pub installed: Vec<String>,

    /// Entries that failed
    pub failed: Vec<BootFailure>,

    /// Features installed because they are flagged `install: auto`
    pub auto_installed: Vec<FeatureId>,
}

impl BootReport {
    /// Whether every entry succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failed entries a later boot may still install
    pub fn retryable(&self) -> impl Iterator<Item = &BootFailure> {
        self.failed.iter().filter(|f| f.retryable)
    }
}

/// Applies the boot feature list against the engine
pub struct BootInstaller {
    engine: Arc<ProvisioningEngine>,
    auto_features: bool,
}

impl BootInstaller {
    /// Create a boot installer that also installs `install: auto` features
    pub fn new(engine: Arc<ProvisioningEngine>) -> Self {
        Self {
            engine,
            auto_features: true,
        }
    }

    /// Enable or disable installing `install: auto` features
    pub fn with_auto_features(mut self, enabled: bool) -> Self {
        self.auto_features = enabled;
        self
    }

    /// Install a comma-separated boot string
    pub async fn install_boot_string(&self, list: &str) -> BootReport {
        let entries: Vec<String> = list.split(',').map(String::from).collect();
        self.install_boot_features(&entries).await
    }

    /// Install each entry in order; never fails
    pub async fn install_boot_features(&self, entries: &[String]) -> BootReport {
        let mut report = BootReport::default();

        for entry in entries {
            let Some(boot) = BootFeature::parse(entry) else {
                continue;
            };
            let label = entry.trim().to_string();

            match self.engine.install_feature(&boot.name, &boot.version).await {
                Ok(result) => {
                    debug!(
                        "Boot feature {} done ({} installed)",
                        label,
                        result.installed.len()
                    );
                    report.installed.push(label);
                }
                Err(e) => {
                    warn!("Error installing boot feature {}: {}", label, e);
                    report.failed.push(BootFailure {
                        entry: label,
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }

        if self.auto_features {
            self.install_auto_features(&mut report).await;
        }

        info!(
            "Boot features: {} installed, {} failed",
            report.installed.len() + report.auto_installed.len(),
            report.failed.len()
        );
        report
    }

    /// Install the highest version of every `install: auto` feature, by name
    async fn install_auto_features(&self, report: &mut BootReport) {
        let index = self.engine.features();
        let highest = VersionConstraint::highest();

        for name in index.names() {
            let Some(feature) = index.select(name, &highest) else {
                continue;
            };
            if feature.install != InstallMode::Auto {
                continue;
            }

            let id = feature.id();
            if self.engine.tracker().is_installed(&id) {
                continue;
            }

            let exact = VersionConstraint::parse(&feature.version);
            match self.engine.install_feature(name, &exact).await {
                Ok(_) => report.auto_installed.push(id),
                Err(e) => {
                    warn!("Error installing auto feature {}: {}", id, e);
                    report.failed.push(BootFailure {
                        entry: id.to_string(),
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
    }
}
