//! Layered configuration loading
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. Config file (explicit path, else provisio.yaml in the working
//!    directory, else ~/.provisio/config.yaml)
//! 3. Environment variables (PROVISIO_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use tracing::debug;

/// Configuration file names to search for in the working directory
const CONFIG_FILE_NAMES: &[&str] = &["provisio.yaml", "provisio.yml"];

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "PROVISIO_";

/// Provisio configuration values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioConfig {
    /// Installation state file
    pub state_path: Utf8PathBuf,

    /// Directory artifacts are deployed into
    pub deploy_dir: Utf8PathBuf,

    /// Directory replicated configuration files are written to
    pub config_dir: Utf8PathBuf,

    /// Repository URIs loaded on every start
    pub repositories: Vec<String>,

    /// Boot feature entries, `name;version=V`
    pub boot_features: Vec<String>,
}

impl Default for ProvisioConfig {
    fn default() -> Self {
        let base = base_dir();
        Self {
            state_path: base.join("state.json"),
            deploy_dir: base.join("deploy"),
            config_dir: base.join("etc"),
            repositories: Vec::new(),
            boot_features: Vec::new(),
        }
    }
}

/// Base directory for Provisio data (~/.provisio, or ./.provisio without a home)
fn base_dir() -> Utf8PathBuf {
    let home = env::var("HOME")
        .ok()
        .map(Utf8PathBuf::from)
        .or_else(|| dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok()))
        .unwrap_or_else(|| Utf8PathBuf::from("."));
    home.join(".provisio")
}

/// Partially specified configuration read from a file
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverlay {
    state_path: Option<Utf8PathBuf>,
    deploy_dir: Option<Utf8PathBuf>,
    config_dir: Option<Utf8PathBuf>,
    repositories: Option<Vec<String>>,
    boot_features: Option<Vec<String>>,
}

/// Loaded configuration with its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Effective configuration
    pub config: ProvisioConfig,

    /// File the configuration was read from, if any
    pub source: Option<Utf8PathBuf>,
}

impl ProvisioConfig {
    /// Load configuration with full precedence
    ///
    /// An explicit path must exist; the implicit search locations are optional.
    pub fn load(path: Option<&Utf8Path>) -> Result<LoadedConfig> {
        let mut config = ProvisioConfig::default();

        let source = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::config_not_found(p.as_str()));
                }
                Some(p.to_owned())
            }
            None => Self::find_config(),
        };

        if let Some(file) = &source {
            debug!("Loading configuration from {}", file);
            let overlay = Self::load_overlay(file)?;
            config = config.merge(overlay);
        }

        config.apply_env_overrides(|key| env::var(key).ok());

        Ok(LoadedConfig { config, source })
    }

    /// Parse configuration from YAML text on top of the defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        let overlay: ConfigOverlay = serde_yaml_ng::from_str(content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse config: {}", e)))?;
        Ok(ProvisioConfig::default().merge(overlay))
    }

    /// Search the implicit config locations
    fn find_config() -> Option<Utf8PathBuf> {
        let local = CONFIG_FILE_NAMES
            .iter()
            .map(|name| Utf8PathBuf::from(*name))
            .find(|p| p.exists());
        if local.is_some() {
            return local;
        }

        let global = base_dir().join("config.yaml");
        global.exists().then_some(global)
    }

    fn load_overlay(path: &Utf8Path) -> Result<ConfigOverlay> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Merge a file overlay (overlay wins where set)
    fn merge(self, overlay: ConfigOverlay) -> Self {
        Self {
            state_path: overlay.state_path.unwrap_or(self.state_path),
            deploy_dir: overlay.deploy_dir.unwrap_or(self.deploy_dir),
            config_dir: overlay.config_dir.unwrap_or(self.config_dir),
            repositories: overlay.repositories.unwrap_or(self.repositories),
            boot_features: overlay.boot_features.unwrap_or(self.boot_features),
        }
    }

    /// Apply PROVISIO_* overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        if let Some(value) = var("STATE_PATH") {
            self.state_path = Utf8PathBuf::from(value);
        }
        if let Some(value) = var("DEPLOY_DIR") {
            self.deploy_dir = Utf8PathBuf::from(value);
        }
        if let Some(value) = var("CONFIG_DIR") {
            self.config_dir = Utf8PathBuf::from(value);
        }
        if let Some(value) = var("REPOSITORIES") {
            self.repositories = split_list(&value);
        }
        if let Some(value) = var("BOOT_FEATURES") {
            self.boot_features = split_list(&value);
        }
    }
}

/// Split a comma-separated list, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
