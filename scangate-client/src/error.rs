//! Failures of a single call against the scanning backend
//!
//! Every endpoint answers either a JSON body or a non-2xx status with a
//! plain-text reason. A 503 means the backend's own request ceiling was hit.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend could not be reached, or the connection dropped mid-call
    #[error("scan backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx answer; `body` is whatever text the backend sent with it
    #[error("scan backend answered {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A 2xx answer whose body is not the expected upload, product or app document
    #[error("unexpected scan backend payload: {0}")]
    Malformed(String),

    /// The artifact could not be read from disk
    #[error("cannot read artifact: {0}")]
    Artifact(#[from] std::io::Error),

    /// Host, credentials or upload name cannot form a valid backend call
    #[error("bad scan backend settings: {0}")]
    Config(String),
}

impl ClientError {
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    /// HTTP status of a rejected call
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The backend answers 503 when more than its request ceiling is in flight
    pub fn is_unavailable(&self) -> bool {
        self.status() == Some(503)
    }
}
