//! Upload endpoint

use crate::ScanClient;
use crate::error::{ClientError, Result};
use reqwest::{Body, Url};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use scangate_core::domain::scan::UploadResponse;
use std::path::Path;
use tracing::debug;

impl ScanClient {
    /// Upload an artifact into a group
    ///
    /// # Arguments
    /// * `group` - The backend group the artifact is filed under
    /// * `name` - File name shown by the backend; spaces become underscores
    /// * `body` - Raw artifact content
    ///
    /// # Returns
    /// The upload acknowledgement carrying product id, fingerprint and phase
    pub async fn upload(
        &self,
        group: &str,
        name: &str,
        body: impl Into<Body>,
        content_length: Option<u64>,
    ) -> Result<UploadResponse> {
        let url = self.upload_url(name)?;
        debug!("PUT {}", url);

        let mut request = self
            .client
            .put(url)
            .header("Group", group)
            .header(CONTENT_TYPE, "application/octet-stream");
        if let Some(len) = content_length {
            request = request.header(CONTENT_LENGTH, len);
        }

        let response = self.authorize(request).body(body).send().await?;

        self.handle_response(response).await
    }

    /// Upload an in-memory artifact
    pub async fn upload_bytes(
        &self,
        group: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<UploadResponse> {
        let len = content.len() as u64;
        self.upload(group, name, content, Some(len)).await
    }

    /// Stream a file from disk as the artifact body
    pub async fn upload_file(&self, group: &str, name: &str, path: &Path) -> Result<UploadResponse> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        self.upload(group, name, file, Some(len)).await
    }

    /// `{base}/api/upload/{name}` with the name as a single percent-encoded segment
    fn upload_url(&self, name: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::Config(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::Config(format!("base URL '{}' cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "upload", upload_name(name).as_str()]);
        Ok(url)
    }
}

/// The backend accepts a limited character set in upload names
fn upload_name(name: &str) -> String {
    name.replace(' ', "_")
}
