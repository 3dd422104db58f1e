use std::path::PathBuf;

use notely_core::util::{normalize_base_url, normalize_text_option};
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config::{default_config_path, CliConfig, Overrides, Settings};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub config_path: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
}

pub fn run_config(command: ConfigCommands, overrides: &Overrides) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(overrides),
        ConfigCommands::Set {
            url,
            timeout_secs,
            dir,
        } => run_config_set(url, timeout_secs, dir),
    }
}

fn run_config_show(overrides: &Overrides) -> Result<(), CliError> {
    let config_path = default_config_path()?;
    let config = CliConfig::load_from_path(&config_path)?;
    let settings = Settings::resolve(&config, overrides)?;

    let effective = EffectiveConfig {
        config_path,
        api_base_url: settings.client.api_base_url,
        request_timeout_secs: settings.client.request_timeout_secs,
        data_dir: settings.data_dir,
    };
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

fn run_config_set(
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = CliConfig::load()?;
    let updated = apply_config_changes(config, api_url, timeout_secs, data_dir)?;
    let path = updated.save()?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

/// Merge explicit values into `config`, validating each one.
pub fn apply_config_changes(
    mut config: CliConfig,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    data_dir: Option<PathBuf>,
) -> Result<CliConfig, CliError> {
    if api_url.is_none() && timeout_secs.is_none() && data_dir.is_none() {
        return Err(CliError::Config(
            "nothing to set: pass --url, --timeout-secs or --dir".to_string(),
        ));
    }

    if let Some(url) = normalize_text_option(api_url) {
        config.api_base_url = Some(normalize_base_url(&url).map_err(CliError::Config)?);
    }
    if let Some(timeout) = timeout_secs {
        if timeout == 0 {
            return Err(CliError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }
        config.request_timeout_secs = Some(timeout);
    }
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }
    Ok(config)
}
