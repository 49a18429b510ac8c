//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber (JSON or pretty)
//! - Emit one self-contained event per lifecycle milestone
//! - Attach `request_id` and `trace_id` whenever a request is active
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and `RUST_LOG`
//! - No buffering or retry here; delivery is the subscriber's concern

use std::error::Error as StdError;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::observability::context::Correlation;

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},tower_http={level}",
            level = config.level.to_ascii_lowercase()
        ))
    });
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Optional structured fields for a log event. Unset fields are omitted.
#[derive(Debug, Clone, Default)]
pub struct LogFields {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub duration_seconds: Option<f64>,
    pub client_addr: Option<String>,
    pub backend_url: Option<String>,
    pub products_count: Option<usize>,
    pub address: Option<String>,
    pub trace_agent: Option<String>,
    pub error_type: Option<&'static str>,
    pub error: Option<String>,
    pub stack: Option<String>,
}

/// Correlated structured logger for one service.
#[derive(Debug, Clone)]
pub struct Logger {
    service: Arc<str>,
}

macro_rules! emit {
    ($level:expr, $service:expr, $request_id:expr, $trace_id:expr, $fields:expr, $message:expr) => {
        tracing::event!(
            $level,
            service = $service,
            request_id = $request_id,
            trace_id = $trace_id,
            method = $fields.method.as_deref(),
            path = $fields.path.as_deref(),
            status = $fields.status,
            duration_seconds = $fields.duration_seconds,
            client_addr = $fields.client_addr.as_deref(),
            backend_url = $fields.backend_url.as_deref(),
            products_count = $fields.products_count,
            address = $fields.address.as_deref(),
            trace_agent = $fields.trace_agent.as_deref(),
            error_type = $fields.error_type,
            error = $fields.error.as_deref(),
            stack = $fields.stack.as_deref(),
            "{}",
            $message
        )
    };
}

impl Logger {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Emit one structured event.
    ///
    /// `correlation` is `None` only for process lifecycle events.
    pub fn log(&self, level: Level, message: &str, correlation: Option<&Correlation>, fields: LogFields) {
        let service: &str = &self.service;
        let request_id = correlation.map(|c| c.request_id.as_str());
        let trace_id = correlation.map(|c| c.trace_id.to_string());
        let trace_id = trace_id.as_deref();
        if level == Level::ERROR {
            emit!(Level::ERROR, service, request_id, trace_id, fields, message);
        } else if level == Level::WARN {
            emit!(Level::WARN, service, request_id, trace_id, fields, message);
        } else if level == Level::INFO {
            emit!(Level::INFO, service, request_id, trace_id, fields, message);
        } else if level == Level::DEBUG {
            emit!(Level::DEBUG, service, request_id, trace_id, fields, message);
        } else {
            emit!(Level::TRACE, service, request_id, trace_id, fields, message);
        }
    }

    pub fn info(&self, message: &str, correlation: Option<&Correlation>, fields: LogFields) {
        self.log(Level::INFO, message, correlation, fields);
    }

    pub fn warn(&self, message: &str, correlation: Option<&Correlation>, fields: LogFields) {
        self.log(Level::WARN, message, correlation, fields);
    }

    /// Error-level event carrying the error message and its stack.
    pub fn error(
        &self,
        message: &str,
        correlation: Option<&Correlation>,
        err: &(dyn StdError + 'static),
        mut fields: LogFields,
    ) {
        fields.error = Some(err.to_string());
        fields.stack = Some(stack_of(err));
        self.log(Level::ERROR, message, correlation, fields);
    }
}

/// Source chain of `err`, followed by a backtrace when capture is enabled.
fn stack_of(err: &(dyn StdError + 'static)) -> String {
    let mut stack = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        stack.push_str("\ncaused by: ");
        stack.push_str(&cause.to_string());
        source = cause.source();
    }

    let backtrace = std::backtrace::Backtrace::capture();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        stack.push('\n');
        stack.push_str(&backtrace.to_string());
    }
    stack
}
