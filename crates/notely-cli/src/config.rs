//! Persistent CLI configuration and the effective settings derived from it.

use std::path::{Path, PathBuf};

use notely_core::config::ClientConfig;
use notely_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const APP_DIR_NAME: &str = "notely";
const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const API_URL_ENV: &str = "NOTELY_API_URL";
pub const DATA_DIR_ENV: &str = "NOTELY_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

impl CliConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CliError::Config(format!(
                    "Failed to create config directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            CliError::Config(format!(
                "Failed to write config at {}: {error}",
                path.display()
            ))
        })
    }

    fn normalize(&mut self) {
        self.version = default_config_version();
        self.api_base_url = normalize_text_option(self.api_base_url.take());
        self.data_dir = self
            .data_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
    }
}

/// Overrides coming from flags and the environment, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Overrides {
    /// Flags win over environment variables.
    pub fn from_flags_and_env(api_url: Option<String>, data_dir: Option<PathBuf>) -> Self {
        Self {
            api_url: normalize_text_option(api_url)
                .or_else(|| normalize_text_option(std::env::var(API_URL_ENV).ok())),
            data_dir: data_dir.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)),
        }
    }
}

/// Effective settings for one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub client: ClientConfig,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn resolve(config: &CliConfig, overrides: &Overrides) -> Result<Self, CliError> {
        let mut client = ClientConfig::default();
        if let Some(timeout) = config.request_timeout_secs {
            client.request_timeout_secs = timeout;
        }
        if let Some(url) = overrides.api_url.as_ref().or(config.api_base_url.as_ref()) {
            client.api_base_url.clone_from(url);
        }
        let client = client.validated()?;

        let data_dir = match overrides.data_dir.clone().or_else(|| config.data_dir.clone()) {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        Ok(Self { client, data_dir })
    }
}
