//! Shared setup for commands: config, catalog and engine

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use provisio_core::ProvisioConfig;
use provisio_features::{
    Catalog, DirectoryArtifactLoader, DriftReport, FileCatalogSource, FileStateStore,
    ProvisioningEngine,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::output;

/// Everything a command needs, wired from configuration
pub(super) struct Workspace {
    pub config: ProvisioConfig,
    pub catalog: Arc<Catalog>,
    pub engine: Arc<ProvisioningEngine>,
    pub drift: DriftReport,
}

impl Workspace {
    /// Load config, start the engine and load every known repository
    ///
    /// Repositories come from the config file and from the state's
    /// registered list. Failures to load one are printed and skipped.
    pub async fn open(config_path: Option<&Utf8Path>) -> Result<Self> {
        let loaded = ProvisioConfig::load(config_path).context("Failed to load configuration")?;
        if let Some(source) = &loaded.source {
            debug!("Using configuration {}", source);
        }
        let config = loaded.config;

        let catalog = Arc::new(Catalog::new(Arc::new(FileCatalogSource::new())));
        let engine = Arc::new(ProvisioningEngine::new(
            catalog.clone(),
            Arc::new(DirectoryArtifactLoader::new(config.deploy_dir.clone())),
            Arc::new(FileStateStore::new(config.state_path.clone())),
        ));

        let drift = engine.start().await;
        if let Some(error) = &drift.state_error {
            output::warning(&format!(
                "Installation state unreadable, starting empty: {}",
                error
            ));
        }

        let mut repositories: Vec<String> = config.repositories.clone();
        for uri in engine.tracker().repositories() {
            if !repositories.contains(&uri) {
                repositories.push(uri);
            }
        }

        let report = catalog.load_all(&repositories).await;
        for (uri, error) in &report.failed {
            output::warning(&format!("Skipping repository {}: {}", uri, error));
        }

        Ok(Self {
            config,
            catalog,
            engine,
            drift,
        })
    }

    /// Persist the registered repositories (config entries excluded)
    pub fn save_repositories(&self, uris: BTreeSet<String>) -> Result<()> {
        let own: Vec<String> = uris
            .into_iter()
            .filter(|uri| !self.config.repositories.contains(uri))
            .collect();
        self.engine
            .tracker()
            .set_repositories(own)
            .context("Failed to save registered repositories")
    }
}

/// Make a relative descriptor path absolute so it works from any directory
pub(super) fn normalize_uri(uri: &str) -> Result<String> {
    if uri.contains(':') || Utf8Path::new(uri).is_absolute() {
        return Ok(uri.to_string());
    }
    let absolute = std::path::absolute(uri)
        .with_context(|| format!("Failed to resolve path {}", uri))?;
    let absolute = Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| anyhow::anyhow!("Non UTF-8 path: {}", p.display()))?;
    Ok(absolute.to_string())
}
