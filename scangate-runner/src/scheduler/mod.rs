//! Scheduler layer for the runner
//!
//! This layer drives job records through their lifecycle:
//! - `limiter`: caps concurrent backend requests
//! - `submission`: uploads every artifact, throttled, then waits for all acks
//! - `poller`: sweeps the records until all are terminal, the deadline
//!   passes, or the batch is cancelled

pub mod limiter;
pub mod poller;
pub mod submission;

pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use poller::{BatchOutcome, BatchPoller};
pub use submission::SubmissionStage;

use std::future::Future;

/// Runs a backend call on its own task
///
/// Errors and panics both come back as the call's failure reason, so one
/// misbehaving call can never take the scheduler down with it.
pub(crate) async fn guarded<T, F>(call: F) -> Result<T, String>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(e) => Err(format!("backend call aborted: {}", e)),
    }
}
