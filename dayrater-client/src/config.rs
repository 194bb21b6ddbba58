//! Client configuration.

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a [`DayRater`](crate::DayRater) context.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the entries API (e.g., "https://day-rater-server.onrender.com").
    pub api_base_url: String,

    /// Base URL of the authentication provider.
    pub auth_base_url: String,

    /// Public API key sent to the authentication provider as `apikey`.
    pub auth_api_key: Option<String>,

    /// SQLite file for local storage. `None` keeps everything in memory.
    pub storage_path: Option<PathBuf>,

    /// Per-request timeout in seconds. `None` means no timeout.
    pub request_timeout_secs: Option<u64>,

    /// Persist a decrypted snapshot of loaded entries under `entries`.
    /// This writes plaintext notes to local storage.
    pub cache_decrypted_entries: bool,

    /// Send the account id as a `user_id` query filter on reads.
    pub filter_by_account: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://day-rater-server.onrender.com".to_string(),
            auth_base_url: "http://localhost:54321".to_string(),
            auth_api_key: None,
            storage_path: None,
            request_timeout_secs: None,
            cache_decrypted_entries: false,
            filter_by_account: true,
        }
    }
}

impl ClientConfig {
    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> ClientResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that both base URLs are usable.
    pub fn validate(&self) -> ClientResult<()> {
        check_base_url("api_base_url", &self.api_base_url)?;
        check_base_url("auth_base_url", &self.auth_base_url)?;
        if self.request_timeout_secs == Some(0) {
            return Err(ClientError::Config(
                "request_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Entries API base URL without a trailing slash.
    pub(crate) fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Auth provider base URL without a trailing slash.
    pub(crate) fn auth_base(&self) -> &str {
        self.auth_base_url.trim_end_matches('/')
    }
}

fn check_base_url(field: &str, url: &str) -> ClientResult<()> {
    if url.trim().is_empty() {
        return Err(ClientError::Config(format!("missing {field}")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ClientError::Config(format!(
            "{field} must start with http:// or https://, got {url:?}"
        )));
    }
    Ok(())
}

/// Builds the shared HTTP client for a config.
pub(crate) fn http_client(config: &ClientConfig) -> ClientResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
}
