//! Graceful shutdown: drain the server, then flush spans to the collector.

use axum::http::StatusCode;
use frontend_service::config::ServiceConfig;
use frontend_service::{HttpServer, Shutdown, Telemetry};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

mod common;

use common::{client, start_mock_backend, start_mock_collector, start_silent_collector, MockReply};

const UPSTREAM: &str = "4bf92f3577b34da6a3ce929d0e0e4736:00f067aa0ba902b7:0:1";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

fn config(backend_url: &str, endpoint: String) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.backend.url = backend_url.to_string();
    config.backend.products_timeout_ms = 500;
    config.server.request_timeout_secs = 10;
    config.backend.slow_timeout_ms = 1_500;
    config.tracing.otlp_endpoint = Some(endpoint);
    // Long enough that only the shutdown flush sends the batch.
    config.tracing.flush_interval_ms = 60_000;
    config.tracing.export_timeout_ms = 2_000;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_flushes_request_spans_to_collector() {
    let collector = start_mock_collector().await;
    let backend = start_mock_backend(|_| MockReply::ok("[]")).await;
    let config = config(&backend.url(), collector.endpoint());

    let telemetry = Telemetry::start(&config.tracing).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, telemetry.clone()).unwrap();
    let rx = shutdown.subscribe();
    let serving = tokio::spawn(async move { server.run(listener, rx).await });

    let response = client()
        .get(format!("{}/api/products", base))
        .header("uber-trace-id", UPSTREAM)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(collector.exports().is_empty());

    shutdown.trigger();
    serving.await.unwrap().unwrap();
    assert_eq!(telemetry.tracer.stats().open(), 0);

    assert!(telemetry.shutdown(Duration::from_secs(5)).await);

    let exports = collector.exports();
    assert!(!exports.is_empty());
    let export = &exports[0];
    assert_eq!(export.method, "POST");
    assert_eq!(export.path, "/v1/traces");
    assert_eq!(export.headers["content-type"], "application/x-protobuf");

    let body: Vec<u8> = exports.iter().flat_map(|e| e.body.clone()).collect();
    assert!(contains(&body, &hex_bytes("4bf92f3577b34da6a3ce929d0e0e4736")));
    assert!(contains(&body, b"GET /api/products"));
    assert!(contains(&body, b"call_backend_products"));
    assert!(contains(&body, b"frontend-service"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_gives_up_on_unresponsive_collector() {
    let collector = start_silent_collector().await;
    let config = config(
        "http://127.0.0.1:9",
        format!("http://{}/v1/traces", collector),
    );

    let telemetry = Telemetry::start(&config.tracing).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, telemetry.clone()).unwrap();
    let rx = shutdown.subscribe();
    let serving = tokio::spawn(async move { server.run(listener, rx).await });

    let response = client().get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    shutdown.trigger();
    serving.await.unwrap().unwrap();

    let budget = Duration::from_millis(300);
    let started = Instant::now();
    assert!(!telemetry.shutdown(budget).await);
    assert!(started.elapsed() < budget + Duration::from_millis(500));
}
