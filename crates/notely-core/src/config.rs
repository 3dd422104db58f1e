//! Client configuration shared by every Notely interface.
//!
//! Holds the API endpoint, the HTTP timeout, and the app-shell description
//! used to pre-warm the offline cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{normalize_base_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "https://notes-api.dicoding.dev/v2";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATIC_ASSETS: [&str; 5] = [
    "/",
    "/index.html",
    "/app.bundle.js",
    "/styles.css",
    "/manifest.json",
];

/// Runtime configuration for the API client and offline layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
    /// App-shell paths pre-cached on install, relative to `app_origin`.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            app_origin: default_app_origin(),
            static_assets: default_static_assets(),
        }
    }
}

impl ClientConfig {
    /// Parse a JSON config payload and validate it.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validated()
    }

    /// Normalize URLs and reject unusable values.
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = normalize_base_url(&self.api_base_url).map_err(Error::InvalidInput)?;
        self.app_origin = normalize_base_url(&self.app_origin).map_err(Error::InvalidInput)?;
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.static_assets = self
            .static_assets
            .into_iter()
            .filter_map(|path| normalize_text_option(Some(path)))
            .map(|path| {
                if path.starts_with('/') {
                    path
                } else {
                    format!("/{path}")
                }
            })
            .collect();
        Ok(self)
    }

    /// Override the API base URL, validating it.
    pub fn with_api_base_url(mut self, url: &str) -> Result<Self> {
        self.api_base_url = normalize_base_url(url).map_err(Error::InvalidInput)?;
        Ok(self)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URLs of the app-shell assets.
    pub fn static_asset_urls(&self) -> Vec<String> {
        self.static_assets
            .iter()
            .map(|path| format!("{}{path}", self.app_origin))
            .collect()
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_app_origin() -> String {
    DEFAULT_APP_ORIGIN.to_string()
}

fn default_static_assets() -> Vec<String> {
    DEFAULT_STATIC_ASSETS.iter().map(ToString::to_string).collect()
}
