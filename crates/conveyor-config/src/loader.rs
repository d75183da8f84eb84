//! Configuration loader with layered sources.

use crate::app_config::AppConfig;
use crate::validation::validate_config;
use config::{Config, Environment, File};
use conveyor_core::{ConveyorError, ConveyorResult};
use std::path::Path;
use tracing::{debug, info};

/// Loads configuration from the default location (`./config`).
pub fn load_config() -> ConveyorResult<AppConfig> {
    load_config_from("./config")
}

/// Loads configuration from the specified directory.
///
/// Sources, in override order:
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (from `CONVEYOR_ENVIRONMENT`)
/// 3. `config/local.toml` (uncommitted overrides)
/// 4. Environment variables with `CONVEYOR_` prefix and `__` separator
pub fn load_config_from(config_dir: &str) -> ConveyorResult<AppConfig> {
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file found or error loading it: {}", e);
    }

    let environment =
        std::env::var("CONVEYOR_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    info!("Loading configuration for environment: {}", environment);

    let mut builder = Config::builder();

    let default_path = format!("{}/default.toml", config_dir);
    if Path::new(&default_path).exists() {
        debug!("Loading default config from: {}", default_path);
        builder = builder.add_source(File::with_name(&default_path).required(false));
    }

    let env_path = format!("{}/{}.toml", config_dir, environment);
    if Path::new(&env_path).exists() {
        debug!("Loading environment config from: {}", env_path);
        builder = builder.add_source(File::with_name(&env_path).required(false));
    }

    let local_path = format!("{}/local.toml", config_dir);
    if Path::new(&local_path).exists() {
        debug!("Loading local config from: {}", local_path);
        builder = builder.add_source(File::with_name(&local_path).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CONVEYOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConveyorError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConveyorError::Configuration(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}
