//! Configuration module
//!
//! Handles the global CLI settings: backend host and credentials.

use anyhow::{Result, bail};
use scangate_client::ClientConfig;

/// CLI configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Base URL of the scanning backend
    pub host: Option<String>,
    /// Basic auth user name
    pub user: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Skip server certificate verification
    pub insecure: bool,
}

impl Config {
    /// Builds the backend connection settings
    pub fn client_config(&self) -> Result<ClientConfig> {
        let Some(host) = self.host.as_deref().filter(|h| !h.trim().is_empty()) else {
            bail!("No backend host given; pass --host or set SCANGATE_HOST");
        };

        let mut config = ClientConfig::new(host.trim()).with_check_certificate(!self.insecure);
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => {
                config = config.with_credentials(user.clone(), password.clone());
            }
            (None, None) => {}
            _ => bail!("--user and --password must be given together"),
        }

        config.validate()?;
        Ok(config)
    }
}
