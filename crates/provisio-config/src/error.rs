//! Error types for provisio-config

use thiserror::Error;

/// Result type alias using provisio-config's error type
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Replication failures
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// The configuration store could not be read or updated
    #[error("Configuration store error for {pid}: {source:#}")]
    Store {
        pid: String,
        #[source]
        source: anyhow::Error,
    },

    /// The configuration file could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file location could not be expressed as a file URL
    #[error("Cannot build a file URL for {path}")]
    FileUrl { path: String },
}

impl ReplicationError {
    /// Create a store error
    pub fn store(pid: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Store {
            pid: pid.into(),
            source,
        }
    }

    /// Create a write error
    pub fn write(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
