//! # provisio-core
//!
//! Core library for Provisio providing:
//! - Feature, repository and installation state types
//! - Version parsing, version constraints and feature selection
//! - Layered configuration loading (provisio.yaml + PROVISIO_* overrides)
//! - The shared error type

pub mod config;
pub mod error;
pub mod selector;
pub mod types;
pub mod version;

pub use config::{LoadedConfig, ProvisioConfig};
pub use error::{Error, Result};
pub use selector::select;
pub use version::{Version, VersionConstraint, DEFAULT_VERSION};
