//! Status command

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use super::common::Workspace;
use crate::cli::StatusArgs;
use crate::output;

#[derive(Tabled, Serialize)]
struct InstalledRow {
    feature: String,
    status: String,
    artifacts: usize,
    #[tabled(rename = "installed at")]
    installed_at: String,
}

#[derive(Serialize)]
struct StatusJson {
    state_path: String,
    deploy_dir: String,
    features: Vec<InstalledRow>,
    incomplete: Vec<String>,
    drifted: Vec<String>,
    stranded: Vec<String>,
    state_error: Option<String>,
}

/// Show installed features and anything out of sync with the deploy directory
pub async fn run(args: StatusArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let state = workspace.engine.tracker().snapshot();
    let drift = &workspace.drift;

    let rows: Vec<InstalledRow> = state
        .features
        .iter()
        .map(|(id, record)| InstalledRow {
            feature: id.to_string(),
            status: format!("{:?}", record.status).to_lowercase(),
            artifacts: record.artifacts.len(),
            installed_at: record.installed_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    if args.json {
        let status = StatusJson {
            state_path: workspace.config.state_path.to_string(),
            deploy_dir: workspace.config.deploy_dir.to_string(),
            features: rows,
            incomplete: drift.incomplete.iter().map(|id| id.to_string()).collect(),
            drifted: drift.drifted.iter().map(|d| d.feature.to_string()).collect(),
            stranded: drift.stranded.iter().map(|h| h.to_string()).collect(),
            state_error: drift.state_error.clone(),
        };
        let json = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
        println!("{}", json);
        return Ok(());
    }

    output::header("Provisio status");
    output::kv("State", workspace.config.state_path.as_str());
    output::kv("Deploy directory", workspace.config.deploy_dir.as_str());
    output::kv("Repositories", &workspace.catalog.repositories().len().to_string());

    if rows.is_empty() {
        output::info("No features installed");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    }

    if drift.is_clean() {
        output::success("Installed features match the deploy directory");
        return Ok(());
    }
    for id in &drift.incomplete {
        output::warning(&format!("{} was not completely installed", id));
    }
    for drifted in &drift.drifted {
        let missing: Vec<&str> = drifted.missing.iter().map(|h| h.as_str()).collect();
        output::warning(&format!(
            "{} is missing artifacts: {}",
            drifted.feature,
            missing.join(", ")
        ));
    }
    if !drift.stranded.is_empty() {
        let stranded: Vec<&str> = drift.stranded.iter().map(|h| h.as_str()).collect();
        output::warning(&format!(
            "Unused artifacts could not be removed and will be retried: {}",
            stranded.join(", ")
        ));
    }
    Ok(())
}
