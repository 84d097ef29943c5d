//! Error types for provisio-core

use thiserror::Error;

/// Result type alias using provisio-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Provisio
///
/// A missing feature is not an error: lookups return `Option` and callers
/// decide whether absence is fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// A non-optional dependency edge (or a top-level request) could not be resolved
    #[error("{}", unsatisfiable_message(.name, .constraint, .required_by.as_deref()))]
    UnsatisfiableDependency {
        name: String,
        constraint: String,
        required_by: Option<String>,
    },

    /// The artifact loader failed to install or update an artifact
    #[error("Failed to load artifact {locator} for feature {feature}: {message}")]
    ArtifactLoad {
        feature: String,
        locator: String,
        message: String,
    },

    /// The artifact loader failed to remove an artifact
    #[error("Failed to remove artifact {artifact}: {message}")]
    ArtifactUnload { artifact: String, message: String },

    /// Refresh after a recorded install/uninstall failed
    #[error("Refresh of {count} artifact(s) failed: {message}")]
    Refresh { count: usize, message: String },

    /// Persisted installation state could not be read or written
    #[error("Installation state I/O error ({path}): {message}")]
    StateIo { path: String, message: String },

    /// A repository descriptor could not be fetched or parsed
    #[error("Failed to load repository {uri}: {message}")]
    Repository { uri: String, message: String },

    /// Uninstall requested for a feature that is not installed
    #[error("Feature {name} {constraint} is not installed")]
    NotInstalled { name: String, constraint: String },

    /// Uninstall with the default constraint matched several installed versions
    #[error("Feature {name} has multiple installed versions ({versions}); specify one")]
    AmbiguousUninstall { name: String, versions: String },

    /// Invalid version string
    #[error("Invalid version format: {version}")]
    InvalidVersion { version: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn unsatisfiable_message(name: &str, constraint: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(parent) => format!(
            "No feature named '{}' with version '{}' available (required by {})",
            name, constraint, parent
        ),
        None => format!(
            "No feature named '{}' with version '{}' available",
            name, constraint
        ),
    }
}

impl Error {
    /// Create an unsatisfiable dependency error
    pub fn unsatisfiable(
        name: impl Into<String>,
        constraint: impl Into<String>,
        required_by: Option<String>,
    ) -> Self {
        Self::UnsatisfiableDependency {
            name: name.into(),
            constraint: constraint.into(),
            required_by,
        }
    }

    /// Create an artifact load error
    pub fn artifact_load(
        feature: impl Into<String>,
        locator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ArtifactLoad {
            feature: feature.into(),
            locator: locator.into(),
            message: message.into(),
        }
    }

    /// Create an artifact unload error
    pub fn artifact_unload(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArtifactUnload {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create a refresh error
    pub fn refresh(count: usize, message: impl Into<String>) -> Self {
        Self::Refresh {
            count,
            message: message.into(),
        }
    }

    /// Create a state I/O error
    pub fn state_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a repository load error
    pub fn repository(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a not-installed error
    pub fn not_installed(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::NotInstalled {
            name: name.into(),
            constraint: constraint.into(),
        }
    }

    /// Create an ambiguous uninstall error
    pub fn ambiguous_uninstall(name: impl Into<String>, versions: &[String]) -> Self {
        Self::AmbiguousUninstall {
            name: name.into(),
            versions: versions.join(", "),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error aborted only the current plan and a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ArtifactLoad { .. } | Self::Refresh { .. } | Self::StateIo { .. }
        )
    }
}
