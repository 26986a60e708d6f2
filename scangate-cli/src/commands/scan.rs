//! Scan command handler
//!
//! Runs one batch over the given files, prints a per-file summary and maps
//! the outcome to an exit code.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use scangate_client::ScanClient;
use scangate_core::domain::job::{JobRecord, JobState};
use scangate_runner::{
    Artifact, BatchOutcome, BatchReport, BatchService, Config as RunnerConfig,
    HttpScanRepository, StandardBatchService,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::signal;

/// Arguments of `scangate scan`
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Backend group the files are filed under
    #[arg(long, short, value_parser = parse_group)]
    pub group: String,

    /// Batch timeout in minutes (minimum 1)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum concurrent backend requests
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Pass the build even when vulnerabilities are found
    #[arg(long)]
    pub no_fail_on_findings: bool,

    /// Write a JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Files to scan
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// How the process should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitStatus {
    Pass,
    Fail,
    TimedOut,
    Cancelled,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Pass => ExitCode::SUCCESS,
            ExitStatus::Fail => ExitCode::from(1),
            ExitStatus::TimedOut => ExitCode::from(2),
            ExitStatus::Cancelled => ExitCode::from(130),
        }
    }
}

/// JSON report written with `--report`
#[derive(Serialize)]
struct ReportFile<'a> {
    verdict: bool,
    elapsed_secs: f64,
    #[serde(flatten)]
    batch: &'a BatchReport,
}

/// Handle the scan command
pub async fn handle_scan_command(args: ScanArgs, config: &Config) -> Result<ExitCode> {
    let mut runner_config = RunnerConfig::from_env()?;
    if let Some(minutes) = args.timeout {
        runner_config = runner_config.with_timeout_minutes(minutes);
    }
    if let Some(max) = args.max_concurrent {
        runner_config = runner_config.with_max_concurrent_requests(max);
    }
    if args.no_fail_on_findings {
        runner_config = runner_config.with_fail_on_findings(false);
    }
    let fail_on_findings = runner_config.fail_on_findings;

    let artifacts = collect_artifacts(&args.files)?;

    let client = ScanClient::from_config(&config.client_config()?)
        .context("Failed to build the backend client")?;
    let repository = Arc::new(HttpScanRepository::new(client));
    let service = StandardBatchService::new(runner_config, repository)?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(signal::cancel_on_signal(cancel.clone()));

    let report = service.run(&args.group, artifacts, &cancel).await;
    signals.abort();

    print_summary(&report);

    if let Some(path) = &args.report {
        write_report(&report, path)?;
        info!("Report written to {}", path.display());
    }

    Ok(exit_status(&report, fail_on_findings).into())
}

fn parse_group(value: &str) -> Result<String, String> {
    value
        .trim()
        .parse::<u64>()
        .map(|group| group.to_string())
        .map_err(|_| format!("group must be an integer, got '{}'", value))
}

fn collect_artifacts(files: &[PathBuf]) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(files.len());
    for path in files {
        if !path.is_file() {
            bail!("Not a file: {}", path.display());
        }
        artifacts.push(Artifact::from_path(path.clone()));
    }
    Ok(artifacts)
}

fn exit_status(report: &BatchReport, fail_on_findings: bool) -> ExitStatus {
    match report.outcome {
        BatchOutcome::Cancelled => ExitStatus::Cancelled,
        BatchOutcome::TimedOut { .. } => ExitStatus::TimedOut,
        BatchOutcome::Completed if report.verdict() => ExitStatus::Pass,
        BatchOutcome::Completed if report.failed().next().is_some() => ExitStatus::Fail,
        BatchOutcome::Completed if fail_on_findings => ExitStatus::Fail,
        BatchOutcome::Completed => ExitStatus::Pass,
    }
}

fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    let file = ReportFile {
        verdict: report.verdict(),
        elapsed_secs: report.elapsed.as_secs_f64(),
        batch: report,
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// Print the per-file summary and the verdict
fn print_summary(report: &BatchReport) {
    println!();
    println!(
        "{}",
        format!("Scan results for group {}:", report.group).bold()
    );
    println!("{}", "─".repeat(80).dimmed());
    for record in &report.records {
        print_record(record);
    }
    println!("{}", "─".repeat(80).dimmed());

    match report.outcome {
        BatchOutcome::Completed => {}
        BatchOutcome::TimedOut { unresolved } => println!(
            "{}",
            format!("⚠ Timed out with {} scan(s) unfinished", unresolved).yellow()
        ),
        BatchOutcome::Cancelled => println!("{}", "⚠ Scan cancelled".yellow()),
    }

    let vulnerable: Vec<_> = report.vulnerable().collect();
    if !vulnerable.is_empty() {
        println!();
        println!("{}", "Files with vulnerabilities:".bold());
        for record in vulnerable {
            print_vulnerable(record);
        }
    }

    println!();
    println!(
        "Verdict: {}  ({:.1}s)",
        if report.verdict() {
            "✓ pass".green().bold()
        } else {
            "✗ fail".red().bold()
        },
        report.elapsed.as_secs_f64()
    );
}

fn print_record(record: &JobRecord) {
    let detail = match (record.state(), record.failure(), record.untriaged_count()) {
        (_, Some(failure), _) => failure.to_string().red(),
        (_, None, Some(0)) => "clean".green(),
        (_, None, Some(n)) => format!("{} untriaged vulnerabilities", n).red(),
        (state, None, None) => state.to_string().yellow(),
    };
    let phase = record
        .scan_phase()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "  {} {:<40} {:<18} {:<6} {:>7} {}",
        status_marker(record),
        record.name(),
        colorize_state(record.state()),
        phase.dimmed(),
        time_taken(record).dimmed(),
        detail
    );
}

/// Time from creation to the terminal state, `-` while unresolved
fn time_taken(record: &JobRecord) -> String {
    match record.finished_at() {
        Some(finished) => format!(
            "{:.1}s",
            (finished - record.created_at()).num_milliseconds().max(0) as f64 / 1000.0
        ),
        None => "-".to_string(),
    }
}

fn print_vulnerable(record: &JobRecord) {
    println!("  {} {}", "▸".red(), record.name().bold());
    let Some(result) = record.result() else {
        return;
    };
    for component in result.vulnerable_components() {
        let cves: Vec<_> = component
            .vulns
            .iter()
            .filter(|v| v.is_untriaged())
            .map(|v| v.vuln.cve.as_str())
            .collect();
        println!(
            "      {} {}: {}",
            component.name(),
            component.version.as_deref().unwrap_or("").dimmed(),
            cves.join(", ")
        );
    }
}

fn status_marker(record: &JobRecord) -> ColoredString {
    match (record.state(), record.untriaged_count()) {
        (JobState::Complete, Some(0)) => "✓".green(),
        (JobState::Complete, _) | (JobState::Failed, _) => "✗".red(),
        _ => "•".yellow(),
    }
}

fn colorize_state(state: JobState) -> ColoredString {
    match state {
        JobState::Complete => state.to_string().green(),
        JobState::Failed => state.to_string().red(),
        _ => state.to_string().yellow(),
    }
}
