//! Per-request instrumentation.
//!
//! # Responsibilities
//! - Open the correlation context and root span on arrival
//! - Hand the [`Correlation`] to handlers through request extensions
//! - Finalize every response exactly once: error accounting, metrics,
//!   root span status, completion log, `x-request-id` header
//!
//! # Design Decisions
//! - Runs outside the timeout and panic layers, so timeouts and panics
//!   produce ordinary responses that pass through [`finalize`]
//! - The root span is finished after the handler has produced its
//!   response and before the response is handed to the connection
//! - If the request future is dropped (client disconnect) the root span
//!   is finished by its drop guard and no metrics are recorded

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

use crate::http::request::{client_addr, route_label, X_REQUEST_ID};
use crate::http::response::{Failure, FailureKind};
use crate::observability::{LogFields, RequestContext, Telemetry};

/// What the pipeline remembers about a request while it is handled.
#[derive(Debug)]
struct Inbound {
    method: Method,
    path: String,
    route: String,
    started: Instant,
}

/// Middleware wrapping every route, including the fallback.
pub async fn instrument(
    State(telemetry): State<Telemetry>,
    mut request: Request,
    next: Next,
) -> Response {
    let inbound = Inbound {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        route: route_label(&request),
        started: Instant::now(),
    };

    let ctx = RequestContext::begin(&telemetry.tracer, telemetry.propagation, &request);
    telemetry.logger.info(
        "Request received",
        Some(ctx.correlation()),
        LogFields {
            method: Some(inbound.method.to_string()),
            path: Some(inbound.path.clone()),
            client_addr: client_addr(&request),
            ..Default::default()
        },
    );

    request.extensions_mut().insert(ctx.correlation().clone());
    let response = next.run(request).await;

    finalize(&telemetry, ctx, inbound, response)
}

fn finalize(
    telemetry: &Telemetry,
    ctx: RequestContext,
    inbound: Inbound,
    mut response: Response,
) -> Response {
    let (correlation, mut root) = ctx.into_parts();
    let status = response.status();

    if let Some(Failure { kind, error }) = response.extensions_mut().remove::<Failure>() {
        telemetry.metrics.increment_error(kind.category());
        root.set_error(&error.to_string());

        if kind == FailureKind::Unhandled {
            telemetry.logger.error(
                "Unhandled error",
                Some(&correlation),
                &*error,
                LogFields {
                    method: Some(inbound.method.to_string()),
                    path: Some(inbound.path.clone()),
                    error_type: Some(kind.category()),
                    ..Default::default()
                },
            );
        }
    }

    let duration = inbound.started.elapsed().as_secs_f64();
    telemetry.metrics.record_request(
        inbound.method.as_str(),
        &inbound.route,
        status.as_u16(),
        duration,
    );

    root.set_tag("http.status_code", i64::from(status.as_u16()));
    if status.as_u16() >= 400 {
        root.set_tag("error", true);
    }
    root.finish();

    if let Ok(value) = HeaderValue::from_str(&correlation.request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    telemetry.logger.info(
        "Request completed",
        Some(&correlation),
        LogFields {
            method: Some(inbound.method.to_string()),
            path: Some(inbound.path),
            status: Some(status.as_u16()),
            duration_seconds: Some(duration),
            ..Default::default()
        },
    );

    response
}
