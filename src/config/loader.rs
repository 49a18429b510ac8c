//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },

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

/// Load configuration from an optional TOML file, apply environment
/// overrides from the process environment, then validate.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the deployment environment variables on top of file values.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = env("PORT") {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            reason: format!("'{}' is not a port number", port),
        })?;
        config.server.bind_address = format!("0.0.0.0:{}", port);
    }

    if let Some(url) = env("BACKEND_URL") {
        config.backend.url = url.trim_end_matches('/').to_string();
    }

    if let Some(host) = env("JAEGER_AGENT_HOST") {
        config.tracing.agent_host = host;
    }

    if let Some(port) = env("JAEGER_AGENT_PORT") {
        config.tracing.agent_port = port.trim().parse().map_err(|_| ConfigError::Env {
            name: "JAEGER_AGENT_PORT",
            reason: format!("'{}' is not a port number", port),
        })?;
    }

    if let Some(endpoint) = env("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT") {
        config.tracing.otlp_endpoint = Some(endpoint);
    }

    if let Some(name) = env("JAEGER_SERVICE_NAME") {
        config.tracing.service_name = name;
    }

    if let Some(level) = env("LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}
