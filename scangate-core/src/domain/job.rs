//! Job domain types
//!
//! A [`JobRecord`] tracks one artifact from upload through scanning to a
//! fetched result. Fields are private; every transition goes through a method
//! that checks the current state, so a record can only move forward, can fail
//! from any non-terminal state, and never changes once terminal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::domain::scan::{ScanPhase, ScanResultResponse, UploadResponse};

/// Lifecycle state of a job record
///
/// Variants are declared in lifecycle order; `Failed` is the terminal branch
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum JobState {
    Pending,
    Uploading,
    Uploaded,
    AwaitingScan,
    ResultRequested,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::AwaitingScan => "awaiting scan",
            Self::ResultRequested => "result requested",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a single job record failed
///
/// Per-item failures never abort the batch; they are recorded here and
/// surfaced in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("upload rejected with status {status}")]
    UploadRejected { status: u16 },

    #[error("status poll failed: {0}")]
    StatusPoll(String),

    #[error("result fetch failed: {0}")]
    ResultFetch(String),

    #[error("backend could not scan the artifact")]
    ScanFailed,

    #[error("timed out waiting for scan result")]
    TimedOut,

    #[error("cancelled before a result was received")]
    Cancelled,
}

/// The next backend call a record needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Scan still running: ask for its status by backend job id
    FetchStatus { product_id: u64 },
    /// Scan ready: fetch the result by content fingerprint
    FetchResult { sha1sum: String },
}

/// Per-item state container
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    name: String,
    state: JobState,
    upload: Option<UploadResponse>,
    scan_phase: Option<ScanPhase>,
    result: Option<ScanResultResponse>,
    failure: Option<JobFailure>,
    result_request_in_flight: bool,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a record for an item that has not been submitted yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: JobState::Pending,
            upload: None,
            scan_phase: None,
            result: None,
            failure: None,
            result_request_in_flight: false,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn upload(&self) -> Option<&UploadResponse> {
        self.upload.as_ref()
    }

    pub fn scan_phase(&self) -> Option<&ScanPhase> {
        self.scan_phase.as_ref()
    }

    pub fn result(&self) -> Option<&ScanResultResponse> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    pub fn result_request_in_flight(&self) -> bool {
        self.result_request_in_flight
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Number of untriaged vulnerabilities, if a result is present
    pub fn untriaged_count(&self) -> Option<usize> {
        self.result.as_ref().map(ScanResultResponse::untriaged_count)
    }

    /// Pending -> Uploading
    pub fn begin_upload(&mut self) -> bool {
        if self.state != JobState::Pending {
            return self.reject("begin upload");
        }
        self.state = JobState::Uploading;
        true
    }

    /// Uploading -> Uploaded, or Failed if the acknowledgement carries a
    /// non-success code
    ///
    /// The phase reported with the acknowledgement is kept, so an artifact
    /// the backend has already scanned goes straight to result fetching.
    pub fn upload_succeeded(&mut self, response: UploadResponse) -> bool {
        if self.state != JobState::Uploading {
            return self.reject("record upload");
        }
        if !response.meta.is_success() {
            let status = response.meta.code;
            self.upload = Some(response);
            return self.fail(JobFailure::UploadRejected { status });
        }
        self.scan_phase = Some(response.phase().clone());
        self.upload = Some(response);
        self.state = JobState::Uploaded;
        true
    }

    /// Works out which backend call advances this record, if any
    ///
    /// Returns `None` for terminal records, records without an upload
    /// acknowledgement and records with a result request outstanding.
    pub fn next_step(&self) -> Option<PollStep> {
        if self.is_terminal() || self.result_request_in_flight {
            return None;
        }
        let upload = self.upload.as_ref()?;
        match self.state {
            JobState::Uploaded | JobState::AwaitingScan => {
                if self.scan_phase.as_ref().is_some_and(ScanPhase::is_ready) {
                    Some(PollStep::FetchResult {
                        sha1sum: upload.sha1sum().to_string(),
                    })
                } else {
                    Some(PollStep::FetchStatus {
                        product_id: upload.product_id(),
                    })
                }
            }
            _ => None,
        }
    }

    /// Uploaded | AwaitingScan -> ResultRequested, raising the in-flight guard
    ///
    /// Returns the fingerprint to fetch, or `None` if the scan is not ready
    /// or a request is already outstanding.
    pub fn begin_result_request(&mut self) -> Option<String> {
        match self.next_step() {
            Some(PollStep::FetchResult { sha1sum }) => {
                self.state = JobState::ResultRequested;
                self.result_request_in_flight = true;
                Some(sha1sum)
            }
            _ => None,
        }
    }

    /// Applies a status poll answer; the record moves to AwaitingScan
    ///
    /// The backend may refresh the job id or fingerprint between polls, so
    /// the stored acknowledgement is replaced. A backend-side scan failure
    /// fails the record.
    pub fn apply_status(&mut self, response: UploadResponse) -> bool {
        if !matches!(self.state, JobState::Uploaded | JobState::AwaitingScan) {
            return self.reject("apply status");
        }
        let phase = response.phase().clone();
        self.upload = Some(response);
        self.scan_phase = Some(phase.clone());
        if phase == ScanPhase::Failed {
            return self.fail(JobFailure::ScanFailed);
        }
        self.state = JobState::AwaitingScan;
        true
    }

    /// ResultRequested -> Complete, clearing the in-flight guard
    pub fn complete(&mut self, result: ScanResultResponse) -> bool {
        if self.state != JobState::ResultRequested {
            return self.reject("complete");
        }
        self.result_request_in_flight = false;
        self.result = Some(result);
        self.state = JobState::Complete;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Any non-terminal state -> Failed
    pub fn fail(&mut self, failure: JobFailure) -> bool {
        if self.is_terminal() {
            return self.reject("fail");
        }
        self.result_request_in_flight = false;
        self.failure = Some(failure);
        self.state = JobState::Failed;
        self.finished_at = Some(Utc::now());
        true
    }

    fn reject(&self, transition: &str) -> bool {
        warn!(
            "Ignoring '{}' for job '{}' in state {}",
            transition, self.name, self.state
        );
        false
    }
}
