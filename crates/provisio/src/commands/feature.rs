//! Feature commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use provisio_core::types::{FeatureId, FeatureStatus, InstallMode};
use provisio_core::VersionConstraint;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

use super::common::Workspace;
use crate::cli::{
    FeatureCommands, FeatureInfoArgs, FeatureInstallArgs, FeatureListArgs, FeatureUninstallArgs,
};
use crate::output;

/// Main entry point for feature subcommands
pub async fn run(cmd: FeatureCommands, config: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        FeatureCommands::List(args) => list(args, config).await,
        FeatureCommands::Info(args) => info(args, config).await,
        FeatureCommands::Install(args) => install(args, config).await,
        FeatureCommands::Uninstall(args) => uninstall(args, config).await,
    }
}

/// Row for the feature list
#[derive(Tabled, serde::Serialize)]
struct FeatureRow {
    name: String,
    version: String,
    status: String,
    description: String,
}

async fn list(args: FeatureListArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let state = workspace.engine.tracker().snapshot();

    let mut rows: BTreeMap<FeatureId, FeatureRow> = BTreeMap::new();

    if !args.installed {
        for feature in workspace.engine.features().iter() {
            rows.insert(
                feature.id(),
                FeatureRow {
                    name: feature.name.clone(),
                    version: feature.version.clone(),
                    status: "available".to_string(),
                    description: feature.description.clone().unwrap_or_else(|| "-".to_string()),
                },
            );
        }
    }

    // Recorded features may come from repositories no longer loaded
    for (id, record) in &state.features {
        let status = match record.status {
            FeatureStatus::Installed => "installed",
            FeatureStatus::Installing => "incomplete",
        };
        let description = workspace
            .engine
            .features()
            .get(id)
            .and_then(|f| f.description.clone())
            .unwrap_or_else(|| "-".to_string());
        rows.insert(
            id.clone(),
            FeatureRow {
                name: id.name.clone(),
                version: id.version.clone(),
                status: status.to_string(),
                description,
            },
        );
    }

    let rows: Vec<FeatureRow> = rows.into_values().collect();

    if args.json {
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize features")?;
        println!("{}", json);
        return Ok(());
    }

    if rows.is_empty() {
        output::info(if args.installed {
            "No features installed"
        } else {
            "No features available; add a repository with `provisio repo add`"
        });
        return Ok(());
    }

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

async fn info(args: FeatureInfoArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let constraint = VersionConstraint::from(args.version.as_deref());

    let Some(feature) = workspace.engine.feature(&args.name, &constraint) else {
        anyhow::bail!("No feature named '{}' with version '{}'", args.name, constraint);
    };

    let id = feature.id();
    output::header(&id.to_string());
    output::kv("Description", feature.description.as_deref().unwrap_or("-"));
    output::kv(
        "Install",
        match feature.install {
            InstallMode::Auto => "auto (at boot)",
            InstallMode::Manual => "manual",
        },
    );
    if let Some(level) = feature.start_level {
        output::kv("Start level", &level.to_string());
    }
    output::kv(
        "Status",
        if workspace.engine.tracker().is_installed(&id) {
            "installed"
        } else {
            "not installed"
        },
    );

    if !feature.dependencies.is_empty() {
        output::header("Dependencies");
        for dependency in &feature.dependencies {
            let mut line = dependency.name.clone();
            if !dependency.version.is_default() {
                line.push_str(&format!(" {}", dependency.version));
            }
            if dependency.optional {
                line.push_str(" (optional)");
            }
            output::item(&line);
        }
    }

    if !feature.artifacts.is_empty() {
        output::header("Artifacts");
        for artifact in &feature.artifacts {
            match feature.start_level_for(artifact) {
                Some(level) => {
                    output::item(&format!("{} (start level {})", artifact.locator, level))
                }
                None => output::item(&artifact.locator),
            }
        }
    }

    let index = workspace.engine.features();
    let versions: Vec<&str> = index
        .versions(&args.name)
        .map(|v| v.keys().map(String::as_str).collect())
        .unwrap_or_default();
    if versions.len() > 1 {
        output::kv("Other versions", &versions.join(", "));
    }
    Ok(())
}

async fn install(args: FeatureInstallArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let constraint = VersionConstraint::from(args.version.as_deref());

    let spinner = output::spinner(&format!("Installing {}...", args.name));
    let result = workspace.engine.install_feature(&args.name, &constraint).await;
    spinner.finish_and_clear();

    let report = result.with_context(|| format!("Failed to install {}", args.name))?;

    for dropped in &report.dropped {
        output::warning(&format!(
            "Optional dependency {} {} of {} is not available",
            dropped.dependency.name, dropped.dependency.version, dropped.required_by
        ));
    }

    if report.is_noop() {
        output::info(&format!("{} is already installed", args.name));
        return Ok(());
    }

    for id in &report.installed {
        output::success(&format!("Installed {}", id));
    }
    if !report.skipped.is_empty() {
        output::info(&format!(
            "{} already installed",
            output::count(report.skipped.len(), "dependency was", "dependencies were")
        ));
    }
    Ok(())
}

async fn uninstall(args: FeatureUninstallArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let constraint = VersionConstraint::from(args.version.as_deref());

    let report = workspace
        .engine
        .uninstall_feature(&args.name, &constraint)
        .await
        .with_context(|| format!("Failed to uninstall {}", args.name))?;

    output::success(&format!("Uninstalled {}", report.feature));
    if !report.retained.is_empty() {
        output::info(&format!(
            "Kept {}, still used by other features",
            output::count(report.retained.len(), "artifact", "artifacts")
        ));
    }
    Ok(())
}
