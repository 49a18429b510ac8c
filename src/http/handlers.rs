//! Route handlers.

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;

use crate::backend::{BackendResponse, DownstreamRoute};
use crate::http::response::AppError;
use crate::http::server::AppState;
use crate::observability::{Correlation, LogFields};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health(
    State(state): State<AppState>,
    Extension(correlation): Extension<Correlation>,
) -> Json<serde_json::Value> {
    let logger = &state.telemetry.logger;
    logger.info("Healthcheck called", Some(&correlation), LogFields::default());

    Json(json!({
        "status": "UP",
        "service": logger.service(),
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.telemetry.metrics.export(),
    )
        .into_response()
}

pub async fn products(
    State(state): State<AppState>,
    Extension(correlation): Extension<Correlation>,
) -> Result<Response, AppError> {
    let route = DownstreamRoute::Products;
    let response = state
        .backend
        .get(route, &correlation)
        .await
        .map_err(|e| AppError::backend(route, e))?;

    state.telemetry.logger.info(
        "Backend response received",
        Some(&correlation),
        LogFields {
            status: Some(response.status.as_u16()),
            products_count: Some(item_count(&response.body)),
            ..Default::default()
        },
    );

    Ok(passthrough(response))
}

pub async fn slow(
    State(state): State<AppState>,
    Extension(correlation): Extension<Correlation>,
) -> Result<Response, AppError> {
    let route = DownstreamRoute::Slow;
    let response = state
        .backend
        .get(route, &correlation)
        .await
        .map_err(|e| AppError::backend(route, e))?;

    state.telemetry.logger.info(
        "Slow backend response received",
        Some(&correlation),
        LogFields {
            status: Some(response.status.as_u16()),
            ..Default::default()
        },
    );

    Ok(passthrough(response))
}

/// Fails every time; used to check that errors show up in logs, metrics
/// and traces.
pub async fn intentional_error(
    State(state): State<AppState>,
    Extension(correlation): Extension<Correlation>,
) -> Result<Response, AppError> {
    state.telemetry.logger.warn(
        "Intentional error triggered",
        Some(&correlation),
        LogFields::default(),
    );
    Err(AppError::Intentional)
}

pub async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "path": uri.path(),
        })),
    )
        .into_response()
}

/// Return a downstream body unchanged.
/// Relay a backend body with the backend's content type, JSON when unset.
fn passthrough(response: BackendResponse) -> Response {
    let content_type = response
        .content_type
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], response.body).into_response()
}

/// Length of a top-level JSON array, zero for anything else.
fn item_count(body: &[u8]) -> usize {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.as_array().map(Vec::len))
        .unwrap_or(0)
}
