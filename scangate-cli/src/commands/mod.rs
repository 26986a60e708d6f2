//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod scan;

pub use scan::ScanArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Upload files, wait for their scans and report the verdict
    Scan(ScanArgs),
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// The process exit code for the command's outcome
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Scan(args) => scan::handle_scan_command(args, config).await,
    }
}
