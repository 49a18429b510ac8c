//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → context.rs (request id, upstream trace context, root span)
//!     → span.rs (child spans around downstream calls)
//!     → metrics.rs (request counter, latency histogram, error counter)
//!     → logging.rs (received / completed / error events)
//!
//! Consumers:
//!     → Log aggregation (stdout JSON lines)
//!     → GET /metrics (Prometheus scrape)
//!     → export.rs → trace collector (OTLP/HTTP batch push)
//! ```
//!
//! # Design Decisions
//! - One `Telemetry` value is built at startup and passed explicitly to the
//!   pipeline and handlers; nothing is installed as a global except the log
//!   subscriber
//! - Request id and trace id flow through all three signals
//! - Metrics are cheap (atomic increments)
//! - The tracer provider is flushed, with a time bound, on shutdown

pub mod context;
#[cfg(test)]
pub(crate) mod exposition;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod span;

use opentelemetry_sdk::trace::SdkTracerProvider;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TracingConfig;
use self::context::Propagation;
use self::logging::Logger;
use self::metrics::Metrics;
use self::export::{otlp_provider, MemorySink};
use self::span::Tracer;

pub use context::{Correlation, RequestContext};
pub use logging::LogFields;

/// Error raised while building the telemetry stack.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to build trace exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
}

/// Process-scoped observability handles. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub tracer: Tracer,
    pub metrics: Arc<Metrics>,
    pub logger: Logger,
    pub propagation: Propagation,
}

impl Telemetry {
    /// Build telemetry whose spans go through `provider`.
    pub fn new(config: &TracingConfig, provider: SdkTracerProvider) -> Result<Self, TelemetryError> {
        Ok(Self {
            tracer: Tracer::new(provider),
            metrics: Arc::new(Metrics::new()?),
            logger: Logger::new(config.service_name.as_str()),
            propagation: config.propagation,
        })
    }

    /// Build telemetry that exports spans to the configured collector.
    pub fn start(config: &TracingConfig) -> Result<Self, TelemetryError> {
        let provider = otlp_provider(config)?;
        Self::new(config, provider)
    }

    /// Build telemetry that keeps spans in memory.
    pub fn in_memory(config: &TracingConfig) -> Result<(Self, MemorySink), TelemetryError> {
        let sink = MemorySink::default();
        let telemetry = Self::new(config, sink.provider(config))?;
        Ok((telemetry, sink))
    }

    /// Export pending spans and stop the exporter, giving up after `budget`.
    ///
    /// Returns `false` if the flush failed or did not complete in time.
    pub async fn shutdown(&self, budget: Duration) -> bool {
        let open = self.tracer.stats().open();
        if open > 0 {
            tracing::warn!(open_spans = open, "Spans still open at shutdown");
        }

        let tracer = self.tracer.clone();
        let flush = tokio::task::spawn_blocking(move || tracer.shutdown_blocking());
        matches!(tokio::time::timeout(budget, flush).await, Ok(Ok(true)))
    }
}
