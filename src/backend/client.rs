//! Instrumented HTTP client for the backend service.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use opentelemetry::trace::SpanKind;
use std::time::Duration;
use url::Url;

use crate::config::BackendConfig;
use crate::observability::{Correlation, LogFields, Telemetry};

/// Backend endpoints this service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamRoute {
    Products,
    Slow,
}

impl DownstreamRoute {
    pub fn path(self) -> &'static str {
        match self {
            DownstreamRoute::Products => "/products",
            DownstreamRoute::Slow => "/slow",
        }
    }

    /// Name of the child span wrapping the call.
    pub fn operation_name(self) -> &'static str {
        match self {
            DownstreamRoute::Products => "call_backend_products",
            DownstreamRoute::Slow => "call_backend_slow",
        }
    }
}

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),

    #[error("backend responded with status {0}")]
    Status(StatusCode),

    #[error("request to backend failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else {
            BackendError::Transport(err)
        }
    }
}

/// Successful backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    /// `Content-Type` as sent by the backend, if any.
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client for the backend service.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    products_timeout: Duration,
    slow_timeout: Duration,
    telemetry: Telemetry,
}

impl BackendClient {
    pub fn new(config: &BackendConfig, telemetry: Telemetry) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            products_timeout: config.products_timeout(),
            slow_timeout: config.slow_timeout(),
            telemetry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout_for(&self, route: DownstreamRoute) -> Duration {
        match route {
            DownstreamRoute::Products => self.products_timeout,
            DownstreamRoute::Slow => self.slow_timeout,
        }
    }

    /// Call `route` once under a child span of the request's root span.
    pub async fn get(
        &self,
        route: DownstreamRoute,
        correlation: &Correlation,
    ) -> Result<BackendResponse, BackendError> {
        let url = format!("{}{}", self.base_url, route.path());
        let timeout = self.timeout_for(route);

        let mut span = self.telemetry.tracer.start_span(
            route.operation_name(),
            SpanKind::Client,
            Some(&correlation.span),
        );
        span.set_tag("http.method", "GET");
        span.set_tag("http.url", url.clone());

        let mut headers = HeaderMap::new();
        self.telemetry.propagation.inject(span.context(), &mut headers);

        self.telemetry.logger.info(
            &format!("Calling backend {}", route.path()),
            Some(correlation),
            LogFields {
                backend_url: Some(self.base_url.clone()),
                ..Default::default()
            },
        );

        match self.send(&url, headers, timeout).await {
            Ok(response) => {
                span.set_tag("http.status_code", i64::from(response.status.as_u16()));
                span.finish();
                Ok(response)
            }
            Err(err) => {
                if let BackendError::Status(status) = &err {
                    span.set_tag("http.status_code", i64::from(status.as_u16()));
                }
                span.set_error(&err.to_string());
                span.finish();

                self.telemetry.logger.error(
                    &format!("Backend call to {} failed", route.path()),
                    Some(correlation),
                    &err,
                    LogFields {
                        backend_url: Some(self.base_url.clone()),
                        ..Default::default()
                    },
                );
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<BackendResponse, BackendError> {
        let url = Url::parse(url)?;
        let response = self
            .http
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status));
        }

        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(e, timeout))?;

        Ok(BackendResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracingConfig;
    use crate::observability::export::MemorySink;
    use crate::observability::span::TagValue;
    use crate::observability::RequestContext;
    use axum::http::Request;

    fn setup(url: &str) -> (BackendClient, Telemetry, MemorySink) {
        let (telemetry, sink) = Telemetry::in_memory(&TracingConfig::default()).unwrap();
        let config = BackendConfig {
            url: url.to_string(),
            products_timeout_ms: 200,
            slow_timeout_ms: 400,
        };
        (BackendClient::new(&config, telemetry.clone()).unwrap(), telemetry, sink)
    }

    #[test]
    fn test_route_table() {
        assert_eq!(DownstreamRoute::Products.path(), "/products");
        assert_eq!(DownstreamRoute::Slow.operation_name(), "call_backend_slow");
    }

    #[tokio::test]
    async fn test_connection_failure_closes_child_span_as_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, telemetry, sink) = setup(&format!("http://{}/", addr));
        assert_eq!(client.base_url(), format!("http://{}", addr));

        let request = Request::builder().uri("/api/products").body(()).unwrap();
        let ctx = RequestContext::begin(&telemetry.tracer, telemetry.propagation, &request);
        let correlation = ctx.correlation().clone();

        let err = client.get(DownstreamRoute::Products, &correlation).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_) | BackendError::Timeout(_)));

        let spans = sink.spans();
        assert_eq!(spans.len(), 1);
        let child = &spans[0];
        assert_eq!(child.operation_name, "call_backend_products");
        assert_eq!(child.parent_id, Some(correlation.span.span_id()));
        assert_eq!(child.kind, SpanKind::Client);
        assert!(child.is_error());
        assert_eq!(child.tag("http.method"), Some(&TagValue::String("GET".into())));

        let (_, root) = ctx.into_parts();
        root.finish();
        assert_eq!(telemetry.tracer.stats().open(), 0);
    }
}
