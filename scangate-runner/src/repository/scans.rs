//! Scans repository
//!
//! Handles communication with the scanning backend:
//! - Submitting artifacts
//! - Polling scan status
//! - Fetching scan results

use anyhow::{Context, Result};
use async_trait::async_trait;
use scangate_client::ScanClient;
use scangate_core::domain::scan::{ScanResultResponse, UploadResponse};
use std::path::PathBuf;

/// An item to scan
#[derive(Debug, Clone)]
pub struct Artifact {
    name: String,
    source: ArtifactSource,
}

/// Where an artifact's content comes from
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Streamed from disk at upload time
    File(PathBuf),
    /// Already in memory
    Bytes(Vec<u8>),
}

impl Artifact {
    /// An artifact backed by a file, named after the file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            name,
            source: ArtifactSource::File(path),
        }
    }

    pub fn from_bytes(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: ArtifactSource::Bytes(content),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ArtifactSource {
        &self.source
    }
}

/// Repository trait for the three backend operations
///
/// Every call is independent; the scheduler gates them through the
/// concurrency limiter before calling in here.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    /// Submits an artifact into a group
    ///
    /// # Arguments
    /// * `group` - Backend group to file the artifact under
    /// * `artifact` - The artifact to upload
    async fn submit(&self, group: &str, artifact: &Artifact) -> Result<UploadResponse>;

    /// Fetches the current scan status by backend job id
    async fn fetch_status(&self, product_id: u64) -> Result<UploadResponse>;

    /// Fetches the scan result by content fingerprint
    async fn fetch_result(&self, sha1sum: &str) -> Result<ScanResultResponse>;
}

/// HTTP implementation of ScanRepository
pub struct HttpScanRepository {
    client: ScanClient,
}

impl HttpScanRepository {
    /// Creates a new HTTP scan repository
    ///
    /// # Arguments
    /// * `client` - A configured backend client
    pub fn new(client: ScanClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScanRepository for HttpScanRepository {
    async fn submit(&self, group: &str, artifact: &Artifact) -> Result<UploadResponse> {
        let response = match artifact.source() {
            ArtifactSource::File(path) => {
                self.client
                    .upload_file(group, artifact.name(), path)
                    .await
            }
            ArtifactSource::Bytes(content) => {
                self.client
                    .upload_bytes(group, artifact.name(), content.clone())
                    .await
            }
        };

        response.with_context(|| format!("Failed to upload '{}'", artifact.name()))
    }

    async fn fetch_status(&self, product_id: u64) -> Result<UploadResponse> {
        self.client
            .product_status(product_id)
            .await
            .with_context(|| format!("Failed to poll status of product {}", product_id))
    }

    async fn fetch_result(&self, sha1sum: &str) -> Result<ScanResultResponse> {
        self.client
            .scan_result(sha1sum)
            .await
            .with_context(|| format!("Failed to fetch result for {}", sha1sum))
    }
}
