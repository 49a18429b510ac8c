//! Error taxonomy and client-facing error responses.
//!
//! # Responsibilities
//! - Map every handler failure to one status code and error category
//! - Build the JSON body the client sees
//! - Tag the response with a [`Failure`] marker for the request pipeline
//! - Convert panics into unhandled-error responses
//!
//! # Design Decisions
//! - One mapping table, consulted by [`FailureKind::mapping`]
//! - Downstream error details reach the client only as a message string
//! - Unhandled errors get a generic body; the real message is only logged

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

use crate::backend::{BackendError, DownstreamRoute};

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BackendCall,
    BackendSlow,
    Intentional,
    Unhandled,
}

/// Row of the failure mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureMapping {
    pub status: StatusCode,
    /// Value of the `type` label on the error counter.
    pub category: &'static str,
    /// `error` field of the client body.
    pub label: &'static str,
}

impl FailureKind {
    pub const fn mapping(self) -> FailureMapping {
        match self {
            FailureKind::BackendCall => FailureMapping {
                status: StatusCode::SERVICE_UNAVAILABLE,
                category: "backend_call_error",
                label: "Backend service unavailable",
            },
            FailureKind::BackendSlow => FailureMapping {
                status: StatusCode::SERVICE_UNAVAILABLE,
                category: "backend_slow_error",
                label: "Timeout or error on slow endpoint",
            },
            FailureKind::Intentional => FailureMapping {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                category: "intentional_error",
                label: "Internal server error",
            },
            FailureKind::Unhandled => FailureMapping {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                category: "unhandled_error",
                label: "Internal error",
            },
        }
    }

    pub fn status(self) -> StatusCode {
        self.mapping().status
    }

    pub fn category(self) -> &'static str {
        self.mapping().category
    }
}

/// Handler-facing error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{source}")]
    Backend {
        route: DownstreamRoute,
        #[source]
        source: BackendError,
    },

    #[error("this error was raised on purpose to exercise the observability pipeline")]
    Intentional,

    #[error("{0}")]
    Unhandled(String),
}

impl AppError {
    pub fn backend(route: DownstreamRoute, source: BackendError) -> Self {
        AppError::Backend { route, source }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::Backend {
                route: DownstreamRoute::Products,
                ..
            } => FailureKind::BackendCall,
            AppError::Backend {
                route: DownstreamRoute::Slow,
                ..
            } => FailureKind::BackendSlow,
            AppError::Intentional => FailureKind::Intentional,
            AppError::Unhandled(_) => FailureKind::Unhandled,
        }
    }
}

/// Response extension marking a failed request.
///
/// Removed by the request pipeline, which accounts for it exactly once.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub error: Arc<AppError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let FailureMapping { status, label, .. } = kind.mapping();

        let body = match &self {
            AppError::Backend { .. } => json!({
                "error": label,
                "message": self.to_string(),
            }),
            AppError::Intentional => json!({
                "error": label,
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            }),
            AppError::Unhandled(_) => json!({
                "error": label,
                "message": "An unexpected error occurred",
            }),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(Failure {
            kind,
            error: Arc::new(self),
        });
        response
    }
}

/// Panic handler for `CatchPanicLayer`.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    AppError::Unhandled(message).into_response()
}
