//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that downstream timeouts fit inside the server-wide timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Span queue size of the batch exporter; a batch cannot exceed it.
const MAX_QUEUED_SPANS: usize = 2_048;

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }

    match Url::parse(&config.backend.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "backend.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("backend.url", e.to_string())),
    }

    let downstream = [
        ("backend.products_timeout_ms", config.backend.products_timeout_ms),
        ("backend.slow_timeout_ms", config.backend.slow_timeout_ms),
    ];
    let server_timeout_ms = config.server.request_timeout_secs.saturating_mul(1_000);
    for (field, timeout_ms) in downstream {
        if timeout_ms == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        } else if server_timeout_ms != 0 && timeout_ms >= server_timeout_ms {
            errors.push(ValidationError::new(
                field,
                format!(
                    "{} ms does not fit inside server.request_timeout_secs ({} s)",
                    timeout_ms, config.server.request_timeout_secs
                ),
            ));
        }
    }

    if config.tracing.agent_host.is_empty() {
        errors.push(ValidationError::new("tracing.agent_host", "must not be empty"));
    }
    if config.tracing.agent_port == 0 {
        errors.push(ValidationError::new("tracing.agent_port", "must be greater than 0"));
    }
    if let Some(endpoint) = &config.tracing.otlp_endpoint {
        match Url::parse(endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "tracing.otlp_endpoint",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("tracing.otlp_endpoint", e.to_string())),
        }
    }
    if config.tracing.max_batch_spans == 0 || config.tracing.max_batch_spans > MAX_QUEUED_SPANS {
        errors.push(ValidationError::new(
            "tracing.max_batch_spans",
            format!("must be between 1 and {}", MAX_QUEUED_SPANS),
        ));
    }
    if config.tracing.flush_interval_ms == 0 {
        errors.push(ValidationError::new("tracing.flush_interval_ms", "must be greater than 0"));
    }
    if config.tracing.export_timeout_ms == 0 {
        errors.push(ValidationError::new("tracing.export_timeout_ms", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!("unknown level '{}'", config.logging.level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
