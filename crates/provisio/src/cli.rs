//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Provisio - Declarative feature provisioning
#[derive(Parser, Debug)]
#[command(name = "provisio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to provisio.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feature repository management
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Feature management
    #[command(subcommand)]
    Feature(FeatureCommands),

    /// Install the boot feature list
    Boot(BootArgs),

    /// Show installed features and drift
    Status(StatusArgs),
}

// Repository commands
#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Register a repository descriptor
    Add(RepoAddArgs),

    /// Unregister a repository descriptor
    Remove(RepoRemoveArgs),

    /// List loaded repositories
    List(RepoListArgs),
}

#[derive(Args, Debug)]
pub struct RepoAddArgs {
    /// Descriptor path or file: URL
    pub uri: String,
}

#[derive(Args, Debug)]
pub struct RepoRemoveArgs {
    /// Descriptor path or file: URL, as registered
    pub uri: String,
}

#[derive(Args, Debug)]
pub struct RepoListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Feature commands
#[derive(Subcommand, Debug)]
pub enum FeatureCommands {
    /// List features
    List(FeatureListArgs),

    /// Show feature details
    Info(FeatureInfoArgs),

    /// Install a feature and its dependencies
    Install(FeatureInstallArgs),

    /// Uninstall a feature
    Uninstall(FeatureUninstallArgs),
}

#[derive(Args, Debug)]
pub struct FeatureListArgs {
    /// Show installed features only
    #[arg(long)]
    pub installed: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FeatureInfoArgs {
    /// Feature name
    pub name: String,

    /// Version or range (highest when omitted)
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Args, Debug)]
pub struct FeatureInstallArgs {
    /// Feature name
    pub name: String,

    /// Version or range (highest when omitted)
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Args, Debug)]
pub struct FeatureUninstallArgs {
    /// Feature name
    pub name: String,

    /// Installed version (required when several are installed)
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Args, Debug)]
pub struct BootArgs {
    /// Extra boot entries, e.g. "ssh;version=1.0.0,shell"
    #[arg(long)]
    pub features: Option<String>,

    /// Skip features flagged install: auto
    #[arg(long)]
    pub no_auto: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
