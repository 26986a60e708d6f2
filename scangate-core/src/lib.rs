//! Scangate Core
//!
//! Core types for the Scangate batch scanning system.
//!
//! This crate contains:
//! - Scan types: the wire shapes returned by the scanning backend
//!   (upload acknowledgements, scan phases, scan results)
//! - Job types: the per-item state machine tracked while a batch is scanned
//!
//! No I/O lives here. The HTTP client and the orchestration loop build on
//! these types.

pub mod domain;

pub use domain::job::{JobFailure, JobRecord, JobState, PollStep};
pub use domain::scan::{ScanPhase, ScanResultResponse, UploadResponse};
