//! Repository commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::collections::BTreeSet;
use tabled::{settings::Style, Table, Tabled};

use super::common::{normalize_uri, Workspace};
use crate::cli::{RepoAddArgs, RepoCommands, RepoListArgs, RepoRemoveArgs};
use crate::output;

/// Main entry point for repository subcommands
pub async fn run(cmd: RepoCommands, config: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        RepoCommands::Add(args) => add(args, config).await,
        RepoCommands::Remove(args) => remove(args, config).await,
        RepoCommands::List(args) => list(args, config).await,
    }
}

#[derive(Tabled, serde::Serialize)]
struct RepositoryRow {
    name: String,
    features: usize,
    registered: String,
    uri: String,
}

async fn add(args: RepoAddArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let uri = normalize_uri(&args.uri)?;

    let loaded = workspace
        .catalog
        .add_repository(&uri)
        .await
        .with_context(|| format!("Failed to add repository {}", uri))?;

    let mut registered: BTreeSet<String> =
        workspace.engine.tracker().repositories().into_iter().collect();
    registered.insert(uri.clone());
    workspace.save_repositories(registered)?;

    if loaded.is_empty() {
        output::info(&format!("Repository {} is already loaded", uri));
    } else {
        for loaded_uri in &loaded {
            output::success(&format!("Added repository {}", loaded_uri));
        }
    }
    Ok(())
}

async fn remove(args: RepoRemoveArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let uri = normalize_uri(&args.uri)?;

    if workspace.config.repositories.contains(&uri) {
        output::warning(&format!(
            "Repository {} is listed in the configuration file and will be loaded again next run",
            uri
        ));
    }

    let mut registered: BTreeSet<String> =
        workspace.engine.tracker().repositories().into_iter().collect();
    let was_registered = registered.remove(&uri);
    let removed = workspace.catalog.remove_repository(&uri);
    workspace.save_repositories(registered)?;

    if removed.is_empty() && !was_registered {
        output::warning(&format!("Repository {} is not registered", uri));
        return Ok(());
    }
    for removed_uri in &removed {
        output::success(&format!("Removed repository {}", removed_uri));
    }
    Ok(())
}

async fn list(args: RepoListArgs, config: Option<&Utf8Path>) -> Result<()> {
    let workspace = Workspace::open(config).await?;
    let registered = workspace.catalog.registered();

    let rows: Vec<RepositoryRow> = workspace
        .catalog
        .repositories()
        .into_iter()
        .map(|repository| RepositoryRow {
            name: repository.name().to_string(),
            features: repository.features().len(),
            registered: if registered.contains(&repository.uri) {
                "yes".to_string()
            } else {
                "referenced".to_string()
            },
            uri: repository.uri,
        })
        .collect();

    if args.json {
        let json =
            serde_json::to_string_pretty(&rows).context("Failed to serialize repositories")?;
        println!("{}", json);
        return Ok(());
    }

    if rows.is_empty() {
        output::info("No repositories loaded");
        return Ok(());
    }

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}
