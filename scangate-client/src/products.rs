//! Product status and scan result endpoints

use crate::ScanClient;
use crate::error::Result;
use scangate_core::domain::scan::{ScanResultResponse, UploadResponse};
use tracing::debug;

impl ScanClient {
    /// Poll the scan status of an uploaded product
    ///
    /// # Arguments
    /// * `product_id` - Backend job id from the upload acknowledgement
    ///
    /// # Returns
    /// A refreshed acknowledgement; its phase tells whether the result is ready
    pub async fn product_status(&self, product_id: u64) -> Result<UploadResponse> {
        let url = format!("{}/api/product/{}/", self.base_url, product_id);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Fetch the scan result of an artifact
    ///
    /// # Arguments
    /// * `sha1sum` - Content fingerprint from the upload acknowledgement
    pub async fn scan_result(&self, sha1sum: &str) -> Result<ScanResultResponse> {
        let url = format!("{}/api/app/{}/", self.base_url, sha1sum);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }
}
