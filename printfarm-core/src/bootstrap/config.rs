//! Configuration loading

use std::path::Path;

use anyhow::Result;

use crate::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PRINTFARM_CONFIG_PATH";

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. `PRINTFARM_CONFIG_PATH` environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. /config/config.yaml (container mount path)
/// 4. Fall back to environment variables only
///
/// Logging is not initialized yet when this runs, so progress goes to stderr.
/// Validation is left to the caller.
pub fn load_config() -> Result<Config> {
    let config_path = find_config_file(std::env::var(CONFIG_PATH_ENV).ok().as_deref());

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env()?
    };

    Ok(config)
}

fn find_config_file(explicit: Option<&str>) -> Option<String> {
    explicit
        .filter(|p| Path::new(p).exists())
        .map(str::to_string)
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| Path::new(p).exists())
                .map(str::to_string)
        })
}
