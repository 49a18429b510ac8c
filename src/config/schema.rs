//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::observability::context::Propagation;

/// Root configuration for the frontend service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener and server-wide settings.
    pub server: ServerConfig,

    /// Downstream backend service.
    pub backend: BackendConfig,

    /// Span creation, propagation and export.
    pub tracing: TracingConfig,

    /// Structured log output.
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Upper bound on total request handling time in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Downstream backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g., "http://backend:5000").
    pub url: String,

    /// Timeout for `GET /products` in milliseconds.
    pub products_timeout_ms: u64,

    /// Timeout for `GET /slow` in milliseconds.
    pub slow_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://backend:5000".to_string(),
            products_timeout_ms: 5_000,
            slow_timeout_ms: 15_000,
        }
    }
}

impl BackendConfig {
    pub fn products_timeout(&self) -> Duration {
        Duration::from_millis(self.products_timeout_ms)
    }

    pub fn slow_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_timeout_ms)
    }
}

/// Tracing and trace export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Service name reported as the `service.name` resource attribute.
    pub service_name: String,

    /// Trace collector host.
    pub agent_host: String,

    /// Collector OTLP/HTTP port.
    pub agent_port: u16,

    /// Full OTLP traces URL; overrides `agent_host` and `agent_port`.
    pub otlp_endpoint: Option<String>,

    /// Header format used when injecting context into downstream calls.
    pub propagation: Propagation,

    /// Batch export interval in milliseconds.
    pub flush_interval_ms: u64,

    /// Largest number of spans sent in one export request.
    pub max_batch_spans: usize,

    /// Upper bound on a single export request in milliseconds.
    pub export_timeout_ms: u64,

    /// Time allowed for the final flush on shutdown, in seconds.
    pub shutdown_flush_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "frontend-service".to_string(),
            agent_host: "jaeger".to_string(),
            agent_port: 4318,
            otlp_endpoint: None,
            propagation: Propagation::Jaeger,
            flush_interval_ms: 1_000,
            max_batch_spans: 100,
            export_timeout_ms: 10_000,
            shutdown_flush_secs: 5,
        }
    }
}

impl TracingConfig {
    /// OTLP/HTTP traces endpoint spans are exported to.
    pub fn endpoint(&self) -> String {
        match &self.otlp_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("http://{}:{}/v1/traces", self.agent_host, self.agent_port),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    pub fn shutdown_flush(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable, for local development.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}
