//! Batch service
//!
//! Runs one scan batch end to end: every artifact is submitted, the
//! uploads are awaited, and the records are polled until they are all
//! terminal or the batch times out or is cancelled. Each batch gets its own
//! request limiter and deadline.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scangate_core::domain::job::JobRecord;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::repository::{Artifact, ScanRepository};
use crate::scheduler::{BatchOutcome, BatchPoller, ConcurrencyLimiter, SubmissionStage};
use crate::service::verdict;

/// Final state of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub group: String,
    pub outcome: BatchOutcome,
    pub records: Vec<JobRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchReport {
    /// Pass/fail verdict over the records
    pub fn verdict(&self) -> bool {
        verdict::evaluate(&self.records)
    }

    /// Records that completed with untriaged findings
    pub fn vulnerable(&self) -> impl Iterator<Item = &JobRecord> {
        verdict::vulnerable(&self.records)
    }

    /// Records that never reached a result
    pub fn failed(&self) -> impl Iterator<Item = &JobRecord> {
        verdict::failed(&self.records)
    }
}

/// Service trait for running scan batches
#[async_trait]
pub trait BatchService: Send + Sync {
    /// Scans `artifacts` under `group` until every record is terminal
    ///
    /// # Arguments
    /// * `group` - Backend group the artifacts are filed under
    /// * `artifacts` - Files to scan, reported back in the same order
    /// * `cancel` - Interrupts the batch when triggered
    ///
    /// # Returns
    /// The terminal records and how the batch ended. Per-item failures and
    /// global timeouts are part of the report, never an error.
    async fn run(
        &self,
        group: &str,
        artifacts: Vec<Artifact>,
        cancel: &CancellationToken,
    ) -> BatchReport;
}

/// Standard implementation of BatchService
pub struct StandardBatchService {
    config: Config,
    repository: Arc<dyn ScanRepository>,
}

impl StandardBatchService {
    /// Creates a new batch service, rejecting an invalid configuration
    pub fn new(config: Config, repository: Arc<dyn ScanRepository>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, repository })
    }
}

/// `started + timeout`, saturating at a point far beyond any real batch
fn batch_deadline(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout)
        .or_else(|| started.checked_add(FAR_FUTURE))
        .unwrap_or(started)
}

/// Roughly thirty years
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[async_trait]
impl BatchService for StandardBatchService {
    async fn run(
        &self,
        group: &str,
        artifacts: Vec<Artifact>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = batch_deadline(started, self.config.timeout);
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrent_requests);

        info!(
            "Starting batch of {} artifact(s), timeout {}s, at most {} concurrent request(s)",
            artifacts.len(),
            self.config.timeout.as_secs(),
            limiter.capacity()
        );

        let mut records = SubmissionStage::new(
            &self.config,
            Arc::clone(&self.repository),
            limiter.clone(),
            group,
        )
        .run(artifacts, deadline, cancel)
        .await;

        let outcome = BatchPoller::new(&self.config, Arc::clone(&self.repository), limiter)
            .run(&mut records, deadline, cancel)
            .await;

        let report = BatchReport {
            group: group.to_string(),
            outcome,
            records,
            started_at,
            finished_at: Utc::now(),
            elapsed: started.elapsed(),
        };

        info!(
            "Batch {} in {:.1}s, verdict: {}",
            report.outcome,
            report.elapsed.as_secs_f64(),
            if report.verdict() { "pass" } else { "fail" }
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBackend, ItemScript};
    use scangate_core::domain::job::{JobFailure, JobState};

    fn artifacts(names: &[&str]) -> Vec<Artifact> {
        names
            .iter()
            .map(|n| Artifact::from_bytes(*n, b"PK\x03\x04".to_vec()))
            .collect()
    }

    fn service(backend: Arc<FakeBackend>, config: Config) -> StandardBatchService {
        StandardBatchService::new(config, backend).unwrap()
    }

    #[test]
    fn test_deadline_never_overflows() {
        let now = Instant::now();
        assert_eq!(batch_deadline(now, Duration::from_secs(60)), now + Duration::from_secs(60));
        assert!(batch_deadline(now, Duration::MAX) > now + Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn test_huge_timeout_is_rejected() {
        let backend = Arc::new(FakeBackend::new([("a", ItemScript::clean(0))]));
        let config = Config::default().with_timeout_minutes(u64::MAX);
        assert!(StandardBatchService::new(config, backend).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let backend = Arc::new(FakeBackend::new([("a", ItemScript::clean(0))]));
        let config = Config::default().with_max_concurrent_requests(0);
        assert!(StandardBatchService::new(config, backend).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_batch_fails_verdict() {
        let backend = Arc::new(FakeBackend::new([
            ("a.jar", ItemScript::clean(1)),
            ("b.jar", ItemScript::upload_error()),
            ("c.jar", ItemScript::never_ready()),
        ]));
        let service = service(backend, Config::default().with_timeout_minutes(1));

        let report = service
            .run(
                "5",
                artifacts(&["a.jar", "b.jar", "c.jar"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.outcome, BatchOutcome::TimedOut { unresolved: 1 });
        assert!(!report.verdict());
        assert_eq!(report.records[0].state(), JobState::Complete);
        assert!(matches!(
            report.records[1].failure(),
            Some(JobFailure::Upload(_))
        ));
        assert_eq!(report.records[2].failure(), Some(&JobFailure::TimedOut));
        assert_eq!(report.failed().count(), 2);
        assert!(report.elapsed <= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_clean_item_passes() {
        let backend = Arc::new(FakeBackend::new([("app.war", ItemScript::clean(0))]));
        let service = service(backend.clone(), Config::default());

        let report = service
            .run("5", artifacts(&["app.war"]), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, BatchOutcome::Completed);
        assert!(report.verdict());
        assert_eq!(backend.result_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_findings_fail_verdict() {
        let backend = Arc::new(FakeBackend::new([
            ("clean.bin", ItemScript::clean(1)),
            ("vuln.bin", ItemScript::vulnerable(2)),
        ]));
        let service = service(backend, Config::default());

        let report = service
            .run(
                "5",
                artifacts(&["clean.bin", "vuln.bin"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.outcome, BatchOutcome::Completed);
        assert!(!report.verdict());
        let vulnerable: Vec<_> = report.vulnerable().map(|r| r.name()).collect();
        assert_eq!(vulnerable, vec!["vuln.bin"]);
        assert_eq!(report.failed().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_do_not_share_limiter() {
        let backend = Arc::new(FakeBackend::new([("a", ItemScript::never_ready())]));
        let service = service(backend.clone(), Config::default().with_timeout_minutes(1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let first = service.run("5", artifacts(&["a"]), &cancel).await;
        assert_eq!(first.outcome, BatchOutcome::Cancelled);

        let second = service
            .run("5", artifacts(&["a"]), &CancellationToken::new())
            .await;
        assert_eq!(second.outcome, BatchOutcome::TimedOut { unresolved: 1 });
        assert!(backend.uploads() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes_outcome_and_records() {
        let backend = Arc::new(FakeBackend::new([("a", ItemScript::clean(0))]));
        let service = service(backend, Config::default());

        let report = service
            .run("5", artifacts(&["a"]), &CancellationToken::new())
            .await;
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["group"], "5");
        assert_eq!(value["outcome"]["status"], "completed");
        assert_eq!(value["records"][0]["name"], "a");
        assert!(value.get("elapsed").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uploads_slower_than_timeout_time_out_the_batch() {
        let backend = Arc::new(
            FakeBackend::new([("huge.iso", ItemScript::clean(0))])
                .with_latency(Duration::from_secs(120)),
        );
        let service = service(backend, Config::default().with_timeout_minutes(1));

        let report = service
            .run("5", artifacts(&["huge.iso"]), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, BatchOutcome::TimedOut { unresolved: 1 });
        assert_eq!(report.records[0].failure(), Some(&JobFailure::TimedOut));
        assert!(!report.verdict());
        assert!(report.elapsed < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_uploads_cancels_the_batch() {
        let backend = Arc::new(
            FakeBackend::new([("huge.iso", ItemScript::clean(0))])
                .with_latency(Duration::from_secs(120)),
        );
        let service = service(backend, Config::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = service.run("5", artifacts(&["huge.iso"]), &cancel).await;

        assert_eq!(report.outcome, BatchOutcome::Cancelled);
        assert_eq!(report.records[0].failure(), Some(&JobFailure::Cancelled));
    }
}
