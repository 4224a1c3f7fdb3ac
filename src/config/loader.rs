//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Collector endpoint override.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Profiling server override.
pub const PYROSCOPE_ADDRESS_ENV: &str = "PYROSCOPE_SERVER_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validated configuration and the environment variables that changed it.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub env_overrides: Vec<&'static str>,
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then `overrides` (command-line flags), and validate once.
///
/// Nothing is logged here: the subscriber is installed from the result.
pub fn load_config<F>(path: Option<&Path>, overrides: F) -> Result<LoadedConfig, ConfigError>
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    let env_overrides = apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(LoadedConfig {
        config,
        env_overrides,
    })
}

/// Apply environment overrides and return the variables that were used.
/// Empty values are ignored, matching the "unset means default" behaviour of
/// the collector tooling.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let mut applied = Vec::new();

    if let Some(endpoint) = lookup(OTLP_ENDPOINT_ENV) {
        config.telemetry.otlp_endpoint = endpoint;
        applied.push(OTLP_ENDPOINT_ENV);
    }
    if let Some(address) = lookup(PYROSCOPE_ADDRESS_ENV) {
        config.profiling.server_address = address;
        applied.push(PYROSCOPE_ADDRESS_ENV);
    }
    applied
}
