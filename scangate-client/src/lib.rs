//! Scangate HTTP Client
//!
//! A small, type-safe HTTP client for the scanning backend.
//!
//! The backend exposes three calls used during a batch scan:
//! - upload an artifact into a group
//! - poll the scan status of an uploaded product
//! - fetch the scan result of an artifact by its SHA-1 fingerprint
//!
//! # Example
//!
//! ```no_run
//! use scangate_client::{ClientConfig, ScanClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://scan.example.com")
//!         .with_credentials("ci-bot", "secret");
//!     let client = ScanClient::from_config(&config)?;
//!
//!     let ack = client.upload_bytes("12", "app.jar", b"PK..".to_vec()).await?;
//!     println!("Uploaded as product {}", ack.product_id());
//!     Ok(())
//! }
//! ```

pub mod error;
mod products;
mod uploads;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use scangate_core::domain::scan::{ScanResultResponse, UploadResponse};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("scangate/", env!("CARGO_PKG_VERSION"));

/// Connection settings for the scanning backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend (e.g., "https://scan.example.com")
    pub host: String,
    /// Basic auth user name
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Verify the server certificate; disable only for self-signed test instances
    pub check_certificate: bool,
    /// Per-request timeout; uploads of large artifacts can take a while
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: None,
            password: None,
            check_certificate: true,
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_check_certificate(mut self, check: bool) -> Self {
        self.check_certificate = check;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(ClientError::Config(format!(
                "host must start with http:// or https://, got '{}'",
                self.host
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ClientError::Config(
                "username and password must be given together".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// HTTP client for the scanning backend
#[derive(Debug, Clone)]
pub struct ScanClient {
    /// Base URL of the backend
    base_url: String,
    /// HTTP client instance
    client: Client,
    credentials: Option<Credentials>,
}

impl ScanClient {
    /// Create a new client without authentication
    ///
    /// # Example
    /// ```
    /// use scangate_client::ScanClient;
    ///
    /// let client = ScanClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client around a preconfigured reqwest Client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials: None,
        }
    }

    /// Build a client from connection settings
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        if config.check_certificate {
            builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);
        } else {
            tracing::warn!("Server certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let mut client = Self::with_client(config.host.clone(), builder.build()?);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            client = client.with_basic_auth(username.clone(), password.clone());
        }
        Ok(client)
    }

    /// Attach basic auth credentials to every request
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turns a backend answer into its JSON document or a `ClientError`
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::rejected(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))
    }
}
