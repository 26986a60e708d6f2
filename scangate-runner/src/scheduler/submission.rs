//! Submission stage
//!
//! Uploads every artifact of a batch and waits until each upload has been
//! acknowledged or has failed. Polling must not start before this returns.

use scangate_core::domain::job::{JobFailure, JobRecord};
use scangate_core::domain::scan::UploadResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::repository::{Artifact, ScanRepository};
use crate::scheduler::{ConcurrencyLimiter, guarded};

/// Drives records from Pending to Uploaded (or Failed)
pub struct SubmissionStage {
    repository: Arc<dyn ScanRepository>,
    limiter: ConcurrencyLimiter,
    group: String,
    pause: Duration,
}

impl SubmissionStage {
    /// Creates a new submission stage
    ///
    /// # Arguments
    /// * `config` - Runner configuration (for the inter-submission pause)
    /// * `repository` - Backend to submit to
    /// * `limiter` - Shared request ceiling
    /// * `group` - Backend group every artifact is filed under
    pub fn new(
        config: &Config,
        repository: Arc<dyn ScanRepository>,
        limiter: ConcurrencyLimiter,
        group: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            limiter,
            group: group.into(),
            pause: config.submit_pause,
        }
    }

    /// Submits all artifacts and returns one record per artifact, in order
    ///
    /// Each returned record is either Uploaded or Failed. Upload failures
    /// stay on their own record. Cancellation or the deadline stops further
    /// submissions and stops waiting for outstanding ones; the affected
    /// records are failed accordingly.
    pub async fn run(
        &self,
        artifacts: Vec<Artifact>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> =
            artifacts.iter().map(|a| JobRecord::new(a.name())).collect();
        let mut uploads = Vec::with_capacity(artifacts.len());

        info!(
            "Submitting {} artifact(s) to group {}",
            artifacts.len(),
            self.group
        );

        for (idx, artifact) in artifacts.into_iter().enumerate() {
            if idx > 0 && !self.pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = time::sleep_until(
                        Instant::now().checked_add(self.pause).unwrap_or(deadline).min(deadline)
                    ) => {}
                }
            }
            if cancel.is_cancelled() || Instant::now() >= deadline {
                break;
            }

            records[idx].begin_upload();
            uploads.push((idx, self.spawn_upload(artifact)));
        }

        for (idx, handle) in uploads {
            let joined = tokio::select! {
                _ = cancel.cancelled() => None,
                _ = time::sleep_until(deadline) => None,
                joined = handle => Some(joined),
            };

            let record = &mut records[idx];
            match joined {
                Some(Ok(Ok(ack))) => {
                    debug!(
                        "Upload of '{}' acknowledged as product {}",
                        record.name(),
                        ack.product_id()
                    );
                    record.upload_succeeded(ack);
                    if let Some(failure) = record.failure() {
                        warn!("Upload of '{}' rejected: {}", record.name(), failure);
                    }
                }
                Some(Ok(Err(reason))) => {
                    warn!("Upload of '{}' failed: {}", record.name(), reason);
                    record.fail(JobFailure::Upload(reason));
                }
                Some(Err(e)) => {
                    warn!("Upload task for '{}' failed: {}", record.name(), e);
                    record.fail(JobFailure::Upload(e.to_string()));
                }
                None => break,
            }
        }

        let interrupted = if cancel.is_cancelled() {
            Some(JobFailure::Cancelled)
        } else if records.iter().any(|r| !r.is_terminal() && r.upload().is_none()) {
            Some(JobFailure::TimedOut)
        } else {
            None
        };
        if let Some(failure) = interrupted {
            self.limiter.close();
            for record in records
                .iter_mut()
                .filter(|r| !r.is_terminal() && r.upload().is_none())
            {
                record.fail(failure.clone());
            }
        }

        let accepted = records.iter().filter(|r| !r.is_terminal()).count();
        info!(
            "Submission finished: {}/{} artifact(s) accepted",
            accepted,
            records.len()
        );

        records
    }

    fn spawn_upload(&self, artifact: Artifact) -> JoinHandle<Result<UploadResponse, String>> {
        let repository = Arc::clone(&self.repository);
        let limiter = self.limiter.clone();
        let group = self.group.clone();

        tokio::spawn(async move {
            let _permit = limiter
                .acquire()
                .await
                .map_err(|_| "batch stopped before upload started".to_string())?;
            debug!("Uploading '{}'", artifact.name());
            guarded(async move { repository.submit(&group, &artifact).await }).await
        })
    }
}
