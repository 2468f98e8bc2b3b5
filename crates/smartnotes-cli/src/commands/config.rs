use std::path::Path;

use smartnotes_core::ClientConfig;

use crate::cli::ConfigCommands;
use crate::config::{load_effective, load_from_path, save_to_path};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            sync_interval,
            request_timeout,
        } => {
            let updated = merge_init(
                load_from_path(config_path)?,
                api_base_url,
                sync_interval,
                request_timeout,
            )?;
            save_to_path(&updated, config_path)?;
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let effective = load_effective(config_path)?;
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&effective)?);
            Ok(())
        }
    }
}

pub fn merge_init(
    mut config: ClientConfig,
    api_base_url: Option<String>,
    sync_interval: Option<u64>,
    request_timeout: Option<u64>,
) -> Result<ClientConfig, CliError> {
    if let Some(api_base_url) = api_base_url {
        config.api_base_url = api_base_url;
    }
    if let Some(secs) = sync_interval {
        config.sync_interval_secs = secs;
    }
    if let Some(secs) = request_timeout {
        config.request_timeout_secs = secs;
    }
    Ok(config.validated()?)
}
