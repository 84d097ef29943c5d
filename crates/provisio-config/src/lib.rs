//! Configuration replication for Provisio
//!
//! Configurations created through other channels than a file (a web
//! console, an API call) are written out as `.cfg` files under a
//! configured directory, so the directory stays the source of truth.
//! Each replicated configuration is tagged with the file's URL and is
//! never replicated again.

pub mod error;
pub mod synchronizer;

pub use error::{ReplicationError, Result};
pub use synchronizer::{
    config_file_name, ConfigSynchronizer, Configuration, ConfigurationEvent,
    ConfigurationEventKind, ConfigurationStore, FACTORY_PID, FILENAME_PROPERTY, SERVICE_PID,
};
