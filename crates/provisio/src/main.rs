//! Provisio CLI - Declarative feature provisioning
//!
//! This is the main entry point for the Provisio command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Repo(cmd) => commands::repo::run(cmd, config).await,
        Commands::Feature(cmd) => commands::feature::run(cmd, config).await,
        Commands::Boot(args) => commands::boot::run(args, config).await,
        Commands::Status(args) => commands::status::run(args, config).await,
    }
}

/// Environment variable overriding the log filter, e.g. `provisio_features=debug`
const LOG_ENV: &str = "PROVISIO_LOG";

/// Filter directive for the given flags
///
/// `--quiet` and `-v` win over the environment; otherwise `PROVISIO_LOG`
/// applies when set, and `info` when not.
fn log_directive(verbose: u8, quiet: bool, env: Option<&str>) -> String {
    match (quiet, verbose, env) {
        (true, _, _) => "error".to_string(),
        (false, 0, Some(directive)) if !directive.trim().is_empty() => directive.to_string(),
        (false, 0, _) => "info".to_string(),
        (false, 1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let env = std::env::var(LOG_ENV).ok();
    let directive = log_directive(verbose, quiet, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_flags() {
        assert_eq!(log_directive(0, false, None), "info");
        assert_eq!(log_directive(1, false, None), "debug");
        assert_eq!(log_directive(2, false, None), "trace");
        assert_eq!(log_directive(2, true, None), "error");
    }

    #[test]
    fn test_log_directive_env_applies_without_flags() {
        let env = Some("provisio_features=debug");
        assert_eq!(log_directive(0, false, env), "provisio_features=debug");
        assert_eq!(log_directive(1, false, env), "debug");
        assert_eq!(log_directive(0, true, env), "error");
        assert_eq!(log_directive(0, false, Some("  ")), "info");
    }
}
