//! Boot installer integration tests
//!
//! Tests boot-time installation including:
//! - Tolerance of unsatisfiable entries
//! - Entry ordering
//! - Auto-install features

mod common;

use common::*;
use provisio_core::types::{FeatureId, FeatureIndex};
use provisio_features::{BootInstaller, MemoryStateStore, ProvisioningEngine};
use std::sync::Arc;

fn boot_engine(index: FeatureIndex, loader: &RecordingLoader) -> Arc<ProvisioningEngine> {
    Arc::new(ProvisioningEngine::new(
        Arc::new(index),
        Arc::new(loader.clone()),
        Arc::new(MemoryStateStore::new()),
    ))
}

fn platform_index() -> FeatureIndex {
    index_of(vec![
        FeatureBuilder::new("transaction")
            .version("1.0.0")
            .artifact("transaction-1.jar"),
        FeatureBuilder::new("transaction")
            .version("2.0.0")
            .artifact("transaction-2.jar"),
        FeatureBuilder::new("ssh").version("1.0.0").artifact("ssh.jar"),
    ])
}

#[cfg(test)]
mod boot {
    use super::*;

    #[tokio::test]
    async fn test_bad_entry_does_not_block_others() {
        let loader = RecordingLoader::new();
        let engine = boot_engine(platform_index(), &loader);

        let report = BootInstaller::new(Arc::clone(&engine))
            .install_boot_string("transaction;version=1.2,ssh;version=1.0.0")
            .await;

        assert_eq!(report.installed, vec!["ssh;version=1.0.0"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entry, "transaction;version=1.2");
        assert!(report.failed[0].error.contains("transaction"));
        assert!(!report.failed[0].retryable);

        assert_eq!(engine.list_installed(), vec![FeatureId::new("ssh", "1.0.0")]);
        assert_eq!(loader.installs(), vec!["ssh.jar"]);
    }

    #[tokio::test]
    async fn test_entries_install_in_order() {
        let loader = RecordingLoader::new();
        let engine = boot_engine(platform_index(), &loader);

        let entries = vec![
            "ssh".to_string(),
            "  ".to_string(),
            "transaction".to_string(),
        ];
        let report = BootInstaller::new(engine).install_boot_features(&entries).await;

        assert!(report.is_success());
        assert_eq!(report.installed, vec!["ssh", "transaction"]);
        assert_eq!(loader.installs(), vec!["ssh.jar", "transaction-2.jar"]);
    }

    #[tokio::test]
    async fn test_failing_artifact_does_not_block_others() {
        let loader = RecordingLoader::new();
        loader.fail_install("transaction-1.jar");
        let engine = boot_engine(platform_index(), &loader);

        let report = BootInstaller::new(engine)
            .install_boot_string("transaction;version=1.0.0, ssh")
            .await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.installed, vec!["ssh"]);

        // A loader failure may clear up on the next boot
        let retryable: Vec<&str> = report.retryable().map(|f| f.entry.as_str()).collect();
        assert_eq!(retryable, vec!["transaction;version=1.0.0"]);
    }

    #[tokio::test]
    async fn test_auto_features_installed_after_list() {
        let loader = RecordingLoader::new();
        let index = index_of(vec![
            FeatureBuilder::new("shell").artifact("shell.jar").auto(),
            FeatureBuilder::new("shell")
                .version("2.0.0")
                .artifact("shell-2.jar")
                .auto(),
            FeatureBuilder::new("ssh").artifact("ssh.jar"),
            FeatureBuilder::new("web").artifact("web.jar"),
        ]);
        let engine = boot_engine(index, &loader);

        let report = BootInstaller::new(Arc::clone(&engine))
            .install_boot_string("ssh")
            .await;

        assert_eq!(report.auto_installed, vec![FeatureId::new("shell", "2.0.0")]);
        assert_eq!(loader.installs(), vec!["ssh.jar", "shell-2.jar"]);
        assert!(!engine.is_installed("web", &provisio_core::VersionConstraint::highest()));
    }

    #[tokio::test]
    async fn test_auto_features_can_be_disabled() {
        let loader = RecordingLoader::new();
        let index = index_of(vec![FeatureBuilder::new("shell").artifact("shell.jar").auto()]);
        let engine = boot_engine(index, &loader);

        let report = BootInstaller::new(engine)
            .with_auto_features(false)
            .install_boot_string("")
            .await;

        assert!(report.auto_installed.is_empty());
        assert!(loader.installs().is_empty());
    }
}
