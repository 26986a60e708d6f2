//! Batch poller
//!
//! Repeatedly sweeps the records of a batch. Each sweep issues at most one
//! backend call per unresolved record: a status poll while the scan runs, a
//! result fetch once the backend reports it ready.
//!
//! The poller owns the records. Backend calls run as independent tasks and
//! hand back a [`Completion`]; only the poll loop applies completions, so a
//! record is never mutated from two places. A record with a call outstanding
//! is skipped by later sweeps.

use scangate_core::domain::job::{JobFailure, JobRecord, JobState, PollStep};
use scangate_core::domain::scan::{ScanResultResponse, UploadResponse};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::repository::ScanRepository;
use crate::scheduler::{ConcurrencyLimiter, guarded};

/// How a batch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every record reached a terminal state
    Completed,
    /// The deadline passed with records still unresolved
    TimedOut { unresolved: usize },
    /// The host interrupted the batch
    Cancelled,
}

impl std::fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut { unresolved } => {
                write!(f, "timed out with {} unresolved record(s)", unresolved)
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Answer of one backend call, applied by the poll loop
#[derive(Debug)]
enum Completion {
    Status(Result<UploadResponse, String>),
    Result(Result<ScanResultResponse, String>),
    /// The limiter was closed before the call started
    Abandoned,
}

enum Interrupt {
    Cancelled,
}

/// Backend calls still running, keyed by task so a lost task can be traced
/// back to its record
#[derive(Default)]
struct InFlight {
    calls: JoinSet<Completion>,
    owners: HashMap<task::Id, usize>,
}

impl InFlight {
    fn spawn<F>(&mut self, idx: usize, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let handle = self.calls.spawn(call);
        self.owners.insert(handle.id(), idx);
    }

    fn contains(&self, idx: usize) -> bool {
        self.owners.values().any(|&owner| owner == idx)
    }

    fn len(&self) -> usize {
        self.owners.len()
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn try_next(&mut self) -> Option<Result<(task::Id, Completion), JoinError>> {
        self.calls.try_join_next_with_id()
    }

    async fn next(&mut self) -> Option<Result<(task::Id, Completion), JoinError>> {
        self.calls.join_next_with_id().await
    }

    /// Record index of a finished task
    fn finish(&mut self, id: task::Id) -> Option<usize> {
        self.owners.remove(&id)
    }

    fn detach(&mut self) {
        self.calls.detach_all();
        self.owners.clear();
    }
}

/// Poll loop driving uploaded records to a terminal state
pub struct BatchPoller {
    repository: Arc<dyn ScanRepository>,
    limiter: ConcurrencyLimiter,
    sweep_interval: Duration,
    backoff_interval: Duration,
}

impl BatchPoller {
    /// Creates a new batch poller
    pub fn new(
        config: &Config,
        repository: Arc<dyn ScanRepository>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            repository,
            limiter,
            sweep_interval: config.sweep_interval,
            backoff_interval: config.backoff_interval,
        }
    }

    /// Polls until every record is terminal, the deadline passes, or `cancel` fires
    ///
    /// On timeout or cancellation, unresolved records are failed with
    /// [`JobFailure::TimedOut`] or [`JobFailure::Cancelled`], no further
    /// backend calls are started, and calls already running are left to
    /// finish with their answers discarded. Records that already timed out
    /// before polling started (during submission) make the batch time out.
    pub async fn run(
        &self,
        records: &mut [JobRecord],
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let mut in_flight = InFlight::default();
        let mut sweep = 0u64;

        info!("Polling {} record(s) for scan results", records.len());

        let outcome = loop {
            if cancel.is_cancelled() {
                break BatchOutcome::Cancelled;
            }

            while let Some(joined) = in_flight.try_next() {
                Self::apply(records, &mut in_flight, joined);
            }

            if all_resolved(records) {
                match timed_out(records) {
                    0 => break BatchOutcome::Completed,
                    n => break BatchOutcome::TimedOut { unresolved: n },
                }
            }

            if Instant::now() >= deadline {
                break BatchOutcome::TimedOut {
                    unresolved: unresolved(records),
                };
            }

            sweep += 1;
            let issued = self.sweep(records, &mut in_flight);
            debug!(
                "Sweep {}: issued {} call(s), {} outstanding, {} unresolved",
                sweep,
                issued,
                in_flight.len(),
                unresolved(records)
            );

            if let Err(Interrupt::Cancelled) = self
                .pause(self.sweep_interval, deadline, cancel, records, &mut in_flight)
                .await
            {
                break BatchOutcome::Cancelled;
            }

            if !all_resolved(records) {
                if let Err(Interrupt::Cancelled) = self
                    .pause(self.backoff_interval, deadline, cancel, records, &mut in_flight)
                    .await
                {
                    break BatchOutcome::Cancelled;
                }
            }
        };

        if outcome != BatchOutcome::Completed {
            self.limiter.close();
            in_flight.detach();

            let failure = match outcome {
                BatchOutcome::Cancelled => JobFailure::Cancelled,
                _ => JobFailure::TimedOut,
            };
            for record in records.iter_mut().filter(|r| !r.is_terminal()) {
                record.fail(failure.clone());
            }
        }

        match outcome {
            BatchOutcome::Completed => info!("Received all results after {} sweep(s)", sweep),
            BatchOutcome::TimedOut { unresolved } => {
                error!("Timed out waiting for {} scan result(s)", unresolved)
            }
            BatchOutcome::Cancelled => warn!("Polling cancelled after {} sweep(s)", sweep),
        }

        outcome
    }

    /// Issues the next backend call for every record that needs one
    fn sweep(&self, records: &mut [JobRecord], in_flight: &mut InFlight) -> usize {
        let mut issued = 0;

        for (idx, record) in records.iter_mut().enumerate() {
            if record.is_terminal() || in_flight.contains(idx) {
                continue;
            }

            let step = match record.next_step() {
                Some(PollStep::FetchResult { .. }) => match record.begin_result_request() {
                    Some(sha1sum) => PollStep::FetchResult { sha1sum },
                    None => continue,
                },
                Some(step) => step,
                None => continue,
            };

            debug!("Record '{}': {:?}", record.name(), step);
            self.spawn_call(in_flight, idx, step);
            issued += 1;
        }

        issued
    }

    fn spawn_call(&self, in_flight: &mut InFlight, idx: usize, step: PollStep) {
        let repository = Arc::clone(&self.repository);
        let limiter = self.limiter.clone();

        in_flight.spawn(idx, async move {
            let Ok(_permit) = limiter.acquire().await else {
                return Completion::Abandoned;
            };

            match step {
                PollStep::FetchStatus { product_id } => Completion::Status(
                    guarded(async move { repository.fetch_status(product_id).await }).await,
                ),
                PollStep::FetchResult { sha1sum } => Completion::Result(
                    guarded(async move { repository.fetch_result(&sha1sum).await }).await,
                ),
            }
        });
    }

    /// Applies a finished backend call to its record
    ///
    /// A task that died without an answer fails its record with the call
    /// the record was waiting on.
    fn apply(
        records: &mut [JobRecord],
        in_flight: &mut InFlight,
        joined: Result<(task::Id, Completion), JoinError>,
    ) {
        let (id, completion) = match joined {
            Ok(finished) => finished,
            Err(e) => {
                let Some(idx) = in_flight.finish(e.id()) else {
                    error!("Poll task for an unknown record ended: {}", e);
                    return;
                };
                let record = &mut records[idx];
                let reason = format!("backend call aborted: {}", e);
                error!("Poll task for '{}' ended unexpectedly: {}", record.name(), e);
                let failure = if record.state() == JobState::ResultRequested {
                    JobFailure::ResultFetch(reason)
                } else {
                    JobFailure::StatusPoll(reason)
                };
                record.fail(failure);
                return;
            }
        };
        let Some(idx) = in_flight.finish(id) else {
            return;
        };
        let record = &mut records[idx];

        match completion {
            Completion::Status(Ok(status)) => {
                debug!("Record '{}' phase: {}", record.name(), status.phase());
                record.apply_status(status);
                if let Some(failure) = record.failure() {
                    warn!("Scan of '{}' failed: {}", record.name(), failure);
                }
            }
            Completion::Status(Err(reason)) => {
                warn!("Status poll for '{}' failed: {}", record.name(), reason);
                record.fail(JobFailure::StatusPoll(reason));
            }
            Completion::Result(Ok(result)) => {
                info!(
                    "Received a result for '{}' ({} untriaged vulnerabilities)",
                    record.name(),
                    result.untriaged_count()
                );
                record.complete(result);
            }
            Completion::Result(Err(reason)) => {
                warn!("Result fetch for '{}' failed: {}", record.name(), reason);
                record.fail(JobFailure::ResultFetch(reason));
            }
            Completion::Abandoned => {}
        }
    }

    /// Sleeps for `duration` (capped at the deadline), applying completions as they arrive
    ///
    /// Returns early once every record is resolved.
    async fn pause(
        &self,
        duration: Duration,
        deadline: Instant,
        cancel: &CancellationToken,
        records: &mut [JobRecord],
        in_flight: &mut InFlight,
    ) -> Result<(), Interrupt> {
        let wake = Instant::now().checked_add(duration).unwrap_or(deadline);
        let sleep = time::sleep_until(wake.min(deadline));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                _ = &mut sleep => return Ok(()),
                Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                    Self::apply(records, in_flight, joined);
                    if all_resolved(records) {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn all_resolved(records: &[JobRecord]) -> bool {
    records.iter().all(JobRecord::is_terminal)
}

fn unresolved(records: &[JobRecord]) -> usize {
    records.iter().filter(|r| !r.is_terminal()).count()
}

fn timed_out(records: &[JobRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.failure() == Some(&JobFailure::TimedOut))
        .count()
}
