//! Correlation context and trace-context propagation.
//!
//! # Responsibilities
//! - Generate a request id for every inbound request (never taken from the client)
//! - Extract an upstream trace context from inbound headers
//! - Inject the current span's context into outbound headers
//!
//! # Design Decisions
//! - Header formats are handled by OpenTelemetry `TextMapPropagator`s:
//!   the Jaeger propagator for `uber-trace-id`, the W3C trace context
//!   propagator for `traceparent`
//! - Both formats are accepted on the way in; the configured one is used on
//!   the way out
//! - A malformed header never fails a request: it is treated as absent and a
//!   new trace is started

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanContext, SpanKind, TraceContextExt, TraceId};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::span::{Span, Tracer};

/// Jaeger propagation header.
pub const UBER_TRACE_ID: &str = "uber-trace-id";

/// W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";

/// Read access to inbound headers for a propagator.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Write access to outbound headers for a propagator.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Wire format for trace context headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// `uber-trace-id: {trace}:{span}:{parent}:{flags}`
    #[default]
    Jaeger,
    /// `traceparent: 00-{trace}-{span}-{flags}`
    W3c,
}

impl Propagation {
    pub fn header_name(self) -> &'static str {
        match self {
            Propagation::Jaeger => UBER_TRACE_ID,
            Propagation::W3c => TRACEPARENT,
        }
    }

    fn other(self) -> Self {
        match self {
            Propagation::Jaeger => Propagation::W3c,
            Propagation::W3c => Propagation::Jaeger,
        }
    }

    fn propagator(self) -> Box<dyn TextMapPropagator + Send + Sync> {
        match self {
            Propagation::Jaeger => Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
            Propagation::W3c => Box::new(TraceContextPropagator::new()),
        }
    }

    /// Serialize `context` into outbound headers.
    pub fn inject(self, context: &SpanContext, headers: &mut HeaderMap) {
        let cx = Context::new().with_remote_span_context(context.clone());
        self.propagator()
            .inject_context(&cx, &mut HeaderInjector(headers));
    }

    /// Read this format's header. `None` when absent or malformed.
    pub fn extract_one(self, headers: &HeaderMap) -> Option<SpanContext> {
        let cx = self.propagator().extract(&HeaderExtractor(headers));
        let span = cx.span();
        let context = span.span_context();
        context.is_valid().then(|| context.clone())
    }

    /// Read an upstream context, trying this format first and then the other.
    ///
    /// A malformed header in the preferred format does not hide a valid one
    /// in the other format.
    pub fn extract(self, headers: &HeaderMap) -> Option<SpanContext> {
        self.extract_one(headers)
            .or_else(|| self.other().extract_one(headers))
    }
}

fn carries_trace_header(headers: &HeaderMap) -> bool {
    headers.contains_key(UBER_TRACE_ID) || headers.contains_key(TRACEPARENT)
}

/// Identifiers joined across logs, metrics and spans for one request.
///
/// Handed to route handlers through request extensions; holds no reference
/// to the owning [`RequestContext`].
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub request_id: String,
    pub trace_id: TraceId,
    /// Context of the request's root span, the parent for downstream calls.
    pub span: SpanContext,
}

/// Per-request observability state, owned by the request pipeline.
#[derive(Debug)]
pub struct RequestContext {
    correlation: Correlation,
    root: Span,
}

impl RequestContext {
    /// Open the correlation context and root span for an inbound request.
    pub fn begin<B>(tracer: &Tracer, propagation: Propagation, request: &Request<B>) -> Self {
        let headers = request.headers();
        let upstream = propagation.extract(headers);
        if upstream.is_none() && carries_trace_header(headers) {
            tracing::debug!("Ignoring malformed inbound trace context");
        }

        let request_id = Uuid::new_v4().to_string();
        let operation = format!("{} {}", request.method(), request.uri().path());

        let mut root = tracer.start_span(operation, SpanKind::Server, upstream.as_ref());
        root.set_tag("http.method", request.method().to_string());
        root.set_tag("http.url", request.uri().to_string());
        root.set_tag("request.id", request_id.clone());

        let span = root.context().clone();
        Self {
            correlation: Correlation {
                request_id,
                trace_id: span.trace_id(),
                span,
            },
            root,
        }
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub fn root_span(&mut self) -> &mut Span {
        &mut self.root
    }

    pub fn into_parts(self) -> (Correlation, Span) {
        (self.correlation, self.root)
    }
}
