//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (trace, instrumentation pipeline, timeout, panics)
//! - Bind the server to a listener and stop on the shutdown signal
//!
//! # Design Decisions
//! - Layer order, outermost first: `TraceLayer`, pipeline, `TimeoutLayer`,
//!   `CatchPanicLayer`; everything inside the pipeline yields a response
//! - The fallback is instrumented like any other route

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::backend::BackendClient;
use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::pipeline::instrument;
use crate::http::response::handle_panic;
use crate::observability::Telemetry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Telemetry,
    pub backend: Arc<BackendClient>,
}

/// HTTP server for the frontend service.
pub struct HttpServer {
    router: Router,
    telemetry: Telemetry,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ServiceConfig, telemetry: Telemetry) -> Result<Self, reqwest::Error> {
        let backend = Arc::new(BackendClient::new(&config.backend, telemetry.clone())?);
        let state = AppState {
            telemetry: telemetry.clone(),
            backend,
        };

        let router = Self::build_router(config, state);
        Ok(Self { router, telemetry })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let telemetry = state.telemetry.clone();
        Router::new()
            .route("/", get(handlers::index))
            .route("/health", get(handlers::health))
            .route("/metrics", get(handlers::metrics))
            .route("/api/products", get(handlers::products))
            .route("/api/slow", get(handlers::slow))
            .route("/api/error", get(handlers::intentional_error))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TimeoutLayer::new(config.server.request_timeout()))
            .layer(from_fn_with_state(telemetry, instrument))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
