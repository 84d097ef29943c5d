//! Replicates configurations to `.cfg` files

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ReplicationError, Result};

/// Property marking a configuration as backed by a file
pub const FILENAME_PROPERTY: &str = "provisio.config.filename";

/// Property holding the configuration pid
pub const SERVICE_PID: &str = "service.pid";

/// Property holding the factory pid
pub const FACTORY_PID: &str = "service.factoryPid";

/// Extension of generated files
const SUFFIX: &str = "cfg";

/// A configuration as held by the configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Persistent identity
    pub pid: String,

    /// Factory the configuration was created from, if any
    pub factory_pid: Option<String>,

    /// Properties; `None` when the configuration has never been updated
    pub properties: Option<BTreeMap<String, String>>,
}

impl Configuration {
    /// Configuration with properties
    pub fn new(pid: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            pid: pid.into(),
            factory_pid: None,
            properties: Some(properties),
        }
    }

    /// Set the factory pid
    pub fn with_factory(mut self, factory_pid: impl Into<String>) -> Self {
        self.factory_pid = Some(factory_pid.into());
        self
    }
}

/// Kind of configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationEventKind {
    Updated,
    Deleted,
    LocationChanged,
}

/// Notification of a configuration change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationEvent {
    pub kind: ConfigurationEventKind,
    pub pid: String,
}

impl ConfigurationEvent {
    /// An update of `pid`
    pub fn updated(pid: impl Into<String>) -> Self {
        Self {
            kind: ConfigurationEventKind::Updated,
            pid: pid.into(),
        }
    }
}

/// Storage the synchronizer reads configurations from and tags them in
pub trait ConfigurationStore: Send + Sync {
    /// Look up a configuration by pid
    fn get(&self, pid: &str) -> anyhow::Result<Option<Configuration>>;

    /// Replace the properties of a configuration
    fn update(&self, pid: &str, properties: BTreeMap<String, String>) -> anyhow::Result<()>;
}

/// File name for a configuration: `<factoryPid>-<identifier>.cfg` or `<pid>.cfg`
///
/// The identifier is the pid without its `<factoryPid>.` prefix.
pub fn config_file_name(configuration: &Configuration) -> String {
    match &configuration.factory_pid {
        Some(factory) => {
            let identifier = configuration
                .pid
                .strip_prefix(factory.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(&configuration.pid);
            format!("{}-{}.{}", factory, identifier, SUFFIX)
        }
        None => format!("{}.{}", configuration.pid, SUFFIX),
    }
}

/// Listens for configuration changes and writes untagged ones to files
pub struct ConfigSynchronizer {
    dir: Utf8PathBuf,
    store: Arc<dyn ConfigurationStore>,
}

impl ConfigSynchronizer {
    /// Replicate into `dir` from `store`
    pub fn new(dir: impl Into<Utf8PathBuf>, store: Arc<dyn ConfigurationStore>) -> Self {
        Self {
            dir: dir.into(),
            store,
        }
    }

    /// Target directory
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Handle a change notification
    ///
    /// Only updates are replicated. Failures are logged and swallowed.
    /// Returns the file written, if any.
    pub fn configuration_event(&self, event: &ConfigurationEvent) -> Option<Utf8PathBuf> {
        if event.kind != ConfigurationEventKind::Updated {
            return None;
        }

        match self.replicate(&event.pid) {
            Ok(written) => written,
            Err(e) => {
                warn!("Can't update configuration {}: {}", event.pid, e);
                None
            }
        }
    }

    /// Write the configuration `pid` to a file unless it already has one
    pub fn replicate(&self, pid: &str) -> Result<Option<Utf8PathBuf>> {
        let configuration = match self
            .store
            .get(pid)
            .map_err(|e| ReplicationError::store(pid, e))?
        {
            Some(configuration) => configuration,
            None => return Ok(None),
        };

        let Some(mut properties) = configuration.properties.clone() else {
            return Ok(None);
        };
        if properties.contains_key(FILENAME_PROPERTY) {
            return Ok(None);
        }

        let file = self.dir.join(config_file_name(&configuration));
        debug!("Replicating config to {}", file);

        let mut written = properties.clone();
        written.remove(SERVICE_PID);
        written.remove(FACTORY_PID);
        self.write_file(&file, &written)?;

        properties.insert(FILENAME_PROPERTY.to_string(), file_url(&file)?);
        self.store
            .update(pid, properties)
            .map_err(|e| ReplicationError::store(pid, e))?;

        Ok(Some(file))
    }

    fn write_file(&self, file: &Utf8Path, properties: &BTreeMap<String, String>) -> Result<()> {
        let io = |e: std::io::Error| ReplicationError::write(file.as_str(), e);

        std::fs::create_dir_all(&self.dir).map_err(io)?;
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(io)?;
        temp.write_all(render(properties).as_bytes()).map_err(io)?;
        temp.as_file().sync_all().map_err(io)?;
        temp.persist(file).map_err(|e| io(e.error))?;
        Ok(())
    }
}

/// `file:` URL of a possibly relative path
fn file_url(path: &Utf8Path) -> Result<String> {
    let absolute = std::path::absolute(path)
        .map_err(|e| ReplicationError::write(path.as_str(), e))?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|_| ReplicationError::FileUrl {
            path: path.to_string(),
        })
}

/// Render properties as `key = value` lines
fn render(properties: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in properties {
        let _ = writeln!(out, "{} = {}", escape(key, true), escape(value, false));
    }
    out
}

fn escape(text: &str, is_key: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            ' ' if is_key || i == 0 => escaped.push_str("\\ "),
            '=' | ':' if is_key => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
