//! Scangate Runner
//!
//! The orchestration core of a batch scan.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Repository: the backend contract and its HTTP implementation
//! - Scheduler: concurrency limiter, submission stage and poll loop
//! - Services: batch driver and verdict evaluation
//!
//! A batch uploads every artifact (paced and capped by the limiter), waits
//! for all uploads to be acknowledged, then polls each uploaded artifact
//! until its result is in, the deadline passes, or the caller cancels.

pub mod config;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use repository::{Artifact, ArtifactSource, HttpScanRepository, ScanRepository};
pub use scheduler::BatchOutcome;
pub use service::{BatchReport, BatchService, StandardBatchService};
