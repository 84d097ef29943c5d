//! Boot command

use anyhow::Result;
use camino::Utf8Path;
use std::sync::Arc;

use super::common::Workspace;
use crate::cli::BootArgs;
use crate::output;
use provisio_features::BootInstaller;

/// Install configured boot features plus any given on the command line
pub async fn run(args: BootArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;

    let mut entries = workspace.config.boot_features.clone();
    if let Some(extra) = &args.features {
        entries.extend(extra.split(',').map(String::from));
    }

    let spinner = output::spinner("Installing boot features...");
    let report = BootInstaller::new(Arc::clone(&workspace.engine))
        .with_auto_features(!args.no_auto)
        .install_boot_features(&entries)
        .await;
    spinner.finish_and_clear();

    for entry in &report.installed {
        output::success(&format!("Boot feature {}", entry));
    }
    for id in &report.auto_installed {
        output::success(&format!("Auto feature {}", id));
    }
    for failure in &report.failed {
        output::error(&format!("{}: {}", failure.entry, failure.error));
    }
    let retryable = report.retryable().count();
    if retryable > 0 {
        output::info(&format!(
            "{} may succeed if `provisio boot` is run again",
            output::count(retryable, "failed entry", "failed entries")
        ));
    }

    if report.is_success() {
        output::info("Boot complete");
    } else {
        output::warning(&format!(
            "Boot complete with {}",
            output::count(report.failed.len(), "failed entry", "failed entries")
        ));
    }
    Ok(())
}
