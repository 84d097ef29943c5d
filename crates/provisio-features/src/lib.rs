//! Feature provisioning for Provisio
//!
//! This crate handles:
//! - Repository loading into a feature catalog
//! - Dependency resolution with diamond dedup
//! - Installation state tracking with artifact reference counts
//! - Installing and uninstalling features through an artifact loader
//! - Boot-time feature installation
//! - File-backed descriptor source and artifact loader

pub mod boot;
pub mod catalog;
pub mod engine;
pub mod loader;
pub mod resolver;
pub mod source;
pub mod state;
pub mod traits;

pub use boot::{BootFailure, BootFeature, BootInstaller, BootReport};
pub use catalog::{Catalog, LoadReport};
pub use engine::{DriftReport, DriftedFeature, InstallReport, ProvisioningEngine, UninstallReport};
pub use loader::DirectoryArtifactLoader;
pub use resolver::{DependencyResolver, DroppedDependency, FeatureRequest, ResolutionPlan};
pub use source::FileCatalogSource;
pub use state::{FileStateStore, MemoryStateStore, StateTracker};
pub use traits::{ArtifactLoader, CatalogProvider, CatalogSource, StateStore};
