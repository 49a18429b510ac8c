//! Span tree management.
//!
//! # Responsibilities
//! - Create root spans for inbound requests and child spans for outbound calls
//! - Hold tags and timestamped events while a span is open
//! - End every span exactly once, handing it to the provider's processors
//!
//! # Design Decisions
//! - Spans are OpenTelemetry SDK spans; this module only adds the
//!   exactly-once guard and the open-span accounting around them
//! - `Span::finish` consumes the span, so a finished span cannot be mutated
//!   or finished again
//! - A span dropped while still open is ended by `Drop` and marked as an
//!   error, so cancellation and early returns cannot leak open spans
//! - The tracer counts started and finished spans; the difference is the
//!   number of spans currently open
//! - Every span is sampled; the export pipeline decides what is kept

use opentelemetry::trace::{
    Span as _, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceId, Tracer as _,
    TracerProvider as _,
};
use opentelemetry::{Context, Key, KeyValue, Value};
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, SpanData};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Instrumentation scope name attached to every span.
pub const INSTRUMENTATION_SCOPE: &str = "frontend-service";

type SdkSpan = <SdkTracer as opentelemetry::trace::Tracer>::Span;

/// A tag or event field value, as read back from a finished span.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&Value> for TagValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => TagValue::Bool(*b),
            Value::I64(i) => TagValue::Int(*i),
            Value::F64(f) => TagValue::Float(*f),
            other => TagValue::String(other.to_string()),
        }
    }
}

fn fields(attributes: &[KeyValue]) -> BTreeMap<String, TagValue> {
    attributes
        .iter()
        .map(|kv| (kv.key.as_str().to_string(), TagValue::from(&kv.value)))
        .collect()
}

/// A timestamped structured event attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub name: String,
    pub timestamp: SystemTime,
    pub fields: BTreeMap<String, TagValue>,
}

/// Read-only view of a completed span.
#[derive(Debug, Clone)]
pub struct FinishedSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_id: Option<SpanId>,
    pub operation_name: String,
    pub kind: SpanKind,
    pub start_time: SystemTime,
    pub duration: Duration,
    pub status: Status,
    pub tags: BTreeMap<String, TagValue>,
    pub logs: Vec<LogEntry>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn is_error(&self) -> bool {
        self.tag("error") == Some(&TagValue::Bool(true))
    }
}

impl From<SpanData> for FinishedSpan {
    fn from(data: SpanData) -> Self {
        let parent_id = (data.parent_span_id != SpanId::INVALID).then_some(data.parent_span_id);
        let logs = data
            .events
            .into_iter()
            .map(|event| LogEntry {
                name: event.name.to_string(),
                timestamp: event.timestamp,
                fields: fields(&event.attributes),
            })
            .collect();

        Self {
            trace_id: data.span_context.trace_id(),
            span_id: data.span_context.span_id(),
            parent_id,
            operation_name: data.name.to_string(),
            kind: data.span_kind,
            start_time: data.start_time,
            duration: data
                .end_time
                .duration_since(data.start_time)
                .unwrap_or_default(),
            status: data.status,
            tags: fields(&data.attributes),
            logs,
        }
    }
}

/// Open-versus-closed counters, the span leak detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanStats {
    pub started: u64,
    pub finished: u64,
}

impl SpanStats {
    pub fn open(&self) -> u64 {
        self.started.saturating_sub(self.finished)
    }
}

struct TracerInner {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    started: AtomicU64,
    finished: AtomicU64,
}

/// Process-scoped span factory. Cheap to clone.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("stats", &self.stats()).finish()
    }
}

impl Tracer {
    pub fn new(provider: SdkTracerProvider) -> Self {
        let tracer = provider.tracer(INSTRUMENTATION_SCOPE);
        Self {
            inner: Arc::new(TracerInner {
                provider,
                tracer,
                started: AtomicU64::new(0),
                finished: AtomicU64::new(0),
            }),
        }
    }

    /// Start a span. With a parent the span joins the parent's trace,
    /// otherwise it starts a new one.
    pub fn start_span(
        &self,
        operation_name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: Option<&SpanContext>,
    ) -> Span {
        let parent_cx = match parent {
            Some(parent) => Context::new().with_remote_span_context(parent.clone()),
            None => Context::new(),
        };
        let operation_name = operation_name.into();
        let span = self
            .inner
            .tracer
            .span_builder(operation_name.clone())
            .with_kind(kind)
            .start_with_context(&self.inner.tracer, &parent_cx);
        self.inner.started.fetch_add(1, Ordering::Relaxed);

        Span {
            tracer: self.clone(),
            context: span.span_context().clone(),
            operation_name,
            inner: Some(span),
        }
    }

    pub fn stats(&self) -> SpanStats {
        SpanStats {
            started: self.inner.started.load(Ordering::Relaxed),
            finished: self.inner.finished.load(Ordering::Relaxed),
        }
    }

    /// Export everything queued and stop the span processors.
    ///
    /// Blocks the calling thread until the exporter is done.
    pub fn shutdown_blocking(&self) -> bool {
        match self.inner.provider.shutdown() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Trace provider shutdown failed");
                false
            }
        }
    }
}

/// An open unit of work.
pub struct Span {
    tracer: Tracer,
    context: SpanContext,
    operation_name: Cow<'static, str>,
    inner: Option<SdkSpan>,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("operation_name", &self.operation_name)
            .field("context", &self.context)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl Span {
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn set_tag(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        if let Some(span) = self.inner.as_mut() {
            span.set_attribute(KeyValue::new(key, value));
        }
    }

    /// Attach a timestamped structured event.
    pub fn log_event<I>(&mut self, name: impl Into<Cow<'static, str>>, fields: I)
    where
        I: IntoIterator<Item = KeyValue>,
    {
        if let Some(span) = self.inner.as_mut() {
            span.add_event(name, fields.into_iter().collect());
        }
    }

    /// Mark the span failed: `error=true`, error status and an error event.
    pub fn set_error(&mut self, message: &str) {
        self.set_tag("error", true);
        if let Some(span) = self.inner.as_mut() {
            span.set_status(Status::error(message.to_string()));
        }
        self.log_event(
            "error",
            [
                KeyValue::new("event", "error"),
                KeyValue::new("message", message.to_string()),
            ],
        );
    }

    /// End the span and hand it to the provider's processors.
    pub fn finish(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if let Some(mut span) = self.inner.take() {
            span.end();
            self.tracer.inner.finished.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        tracing::warn!(
            operation = %self.operation_name,
            trace_id = %self.context.trace_id(),
            span_id = %self.context.span_id(),
            "Span dropped before finish"
        );
        self.set_tag("error", true);
        self.log_event("abandoned", [KeyValue::new("event", "abandoned")]);
        self.complete();
    }
}
