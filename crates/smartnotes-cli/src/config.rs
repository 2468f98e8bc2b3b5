//! Persistent CLI configuration.

use std::env;
use std::path::{Path, PathBuf};

use smartnotes_core::ClientConfig;

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const API_URL_ENV: &str = "SMARTNOTES_API_URL";

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("smartnotes").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit.map_or_else(default_config_path, Ok)
}

/// Stored config, or defaults when the file does not exist yet.
pub fn load_from_path(path: &Path) -> Result<ClientConfig, CliError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|error| {
        CliError::Config(format!(
            "Failed to read config at {}: {}",
            path.display(),
            error
        ))
    })?;
    ClientConfig::from_json(&raw).map_err(|error| {
        CliError::Config(format!("Invalid config at {}: {}", path.display(), error))
    })
}

/// Stored config with environment overrides applied.
pub fn load_effective(path: &Path) -> Result<ClientConfig, CliError> {
    let config = load_from_path(path)?;
    apply_env_overrides(config, env::var(API_URL_ENV).ok())
}

pub fn apply_env_overrides(
    mut config: ClientConfig,
    api_url: Option<String>,
) -> Result<ClientConfig, CliError> {
    if let Some(api_url) = smartnotes_core::util::normalize_text_option(api_url) {
        tracing::debug!("Using API URL from {}", API_URL_ENV);
        config.api_base_url = api_url;
    }
    Ok(config.validated()?)
}

pub fn save_to_path(config: &ClientConfig, path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            CliError::Config(format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                error
            ))
        })?;
    }

    let serialized = serde_json::to_string_pretty(&config.clone().validated()?)?;
    std::fs::write(path, serialized).map_err(|error| {
        CliError::Config(format!(
            "Failed to write config at {}: {}",
            path.display(),
            error
        ))
    })
}
