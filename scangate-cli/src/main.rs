//! Scangate CLI
//!
//! Submits build artifacts to the scanning backend and turns the combined
//! scan outcome into a process exit code.

mod commands;
mod config;
mod signal;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scangate")]
#[command(about = "Scan build artifacts for known vulnerabilities", long_about = None)]
#[command(version)]
struct Cli {
    /// Scanning backend URL
    #[arg(long, env = "SCANGATE_HOST", global = true)]
    host: Option<String>,

    /// Backend user name
    #[arg(long, env = "SCANGATE_USER", global = true)]
    user: Option<String>,

    /// Backend password
    #[arg(long, env = "SCANGATE_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Skip server certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "scangate=info,scangate_runner=info,scangate_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        host: cli.host,
        user: cli.user,
        password: cli.password,
        insecure: cli.insecure,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_command() {
        let cli = Cli::try_parse_from([
            "scangate",
            "--host",
            "https://scan.example.com",
            "scan",
            "--group",
            "12",
            "--timeout",
            "5",
            "--no-fail-on-findings",
            "app.jar",
            "lib.jar",
        ])
        .unwrap();

        assert_eq!(cli.host.as_deref(), Some("https://scan.example.com"));
        let Commands::Scan(args) = cli.command;
        assert_eq!(args.group, "12");
        assert_eq!(args.timeout, Some(5));
        assert!(args.no_fail_on_findings);
        assert_eq!(args.files.len(), 2);
    }

    #[test]
    fn test_group_must_be_an_integer() {
        let result = Cli::try_parse_from(["scangate", "scan", "--group", "web-apps", "app.jar"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_requires_files() {
        let result = Cli::try_parse_from(["scangate", "scan", "--group", "1"]);
        assert!(result.is_err());
    }
}
