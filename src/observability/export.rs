//! Trace export.
//!
//! # Responsibilities
//! - Build the tracer provider that ships finished spans to the collector
//! - Batch spans off the request path and push them as OTLP/HTTP protobuf
//! - Keep finished spans in memory for tests and local runs
//!
//! # Design Decisions
//! - The batch span processor owns the export thread; request handling only
//!   enqueues, and export failures are logged by the SDK
//! - The collector endpoint is OTLP/HTTP (`/v1/traces`), which the Jaeger
//!   collector accepts natively
//! - Every span is sampled (constant sampler); the trace id is kept for
//!   unsampled upstream contexts as well

use opentelemetry::KeyValue;
use opentelemetry_otlp::{ExporterBuildError, Protocol, WithExportConfig};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, InMemorySpanExporter, Sampler, SdkTracerProvider,
};
use opentelemetry_sdk::Resource;

use crate::config::TracingConfig;
use crate::observability::span::FinishedSpan;

/// Resource attributes reported with every span batch.
pub fn resource(config: &TracingConfig) -> Resource {
    Resource::builder()
        .with_attribute(KeyValue::new("service.name", config.service_name.clone()))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Provider exporting through a batch processor to the configured
/// OTLP/HTTP endpoint.
pub fn otlp_provider(config: &TracingConfig) -> Result<SdkTracerProvider, ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(config.endpoint())
        .with_timeout(config.export_timeout())
        .build()?;

    let batch = BatchConfigBuilder::default()
        .with_max_export_batch_size(config.max_batch_spans)
        .with_scheduled_delay(config.flush_interval())
        .build();
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch)
        .build();

    Ok(SdkTracerProvider::builder()
        .with_resource(resource(config))
        .with_sampler(Sampler::AlwaysOn)
        .with_span_processor(processor)
        .build())
}

/// Keeps finished spans in memory. Cheap to clone; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    exporter: InMemorySpanExporter,
}

impl MemorySink {
    /// Provider that exports each span synchronously into this sink.
    pub fn provider(&self, config: &TracingConfig) -> SdkTracerProvider {
        SdkTracerProvider::builder()
            .with_resource(resource(config))
            .with_sampler(Sampler::AlwaysOn)
            .with_simple_exporter(self.exporter.clone())
            .build()
    }

    /// Spans in the order they were finished.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.exporter
            .get_finished_spans()
            .unwrap_or_default()
            .into_iter()
            .map(FinishedSpan::from)
            .collect()
    }
}
