//! HTTP server for the Prometheus scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::RwLock;
use prometheus_client::registry::Registry;
use tokio::sync::{Mutex, watch};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::collector::RouterCollector;
use crate::exposition::{self, CONTENT_TYPE};
use crate::telemetry;

/// Outcome of the most recent collection pass.
#[derive(Debug, Clone, Default)]
pub struct ScrapeStatus {
    /// When a pass last completed without a contract violation.
    pub last_success: Option<Instant>,
    /// Error of the last pass, cleared by the next successful one.
    pub last_error: Option<String>,
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: Arc<RouterCollector>,
    registry: Arc<Registry>,
    /// Serializes collection passes so concurrent scrapes never overlap.
    pass_lock: Arc<Mutex<()>>,
    status: Arc<RwLock<ScrapeStatus>>,
}

/// Create the HTTP router.
fn create_router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Runs one collection pass per request.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let _pass = state.pass_lock.lock().await;
    let started = Instant::now();

    let result = state.collector.collect().await;
    let elapsed = started.elapsed();
    state
        .collector
        .metrics()
        .record_scrape(elapsed.as_secs_f64(), result.is_ok());

    match result {
        Ok(families) => {
            {
                let mut status = state.status.write();
                status.last_success = Some(Instant::now());
                status.last_error = None;
            }

            let mut body = exposition::render(&families);
            match telemetry::encode(&state.registry) {
                Ok(own) => body.push_str(&own),
                Err(e) => error!(error = %e, "Failed to encode exporter metrics"),
            }

            debug!(
                families = families.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Served scrape"
            );
            (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Collection pass failed");
            state.status.write().last_error = Some(e.to_string());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("collection failed: {}\n", e),
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let status = state.status.read().clone();

    match (status.last_success, status.last_error) {
        (_, Some(error)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("not ready - last collection failed: {}\n", error),
        )
            .into_response(),
        (Some(_), None) => (StatusCode::OK, "ready\n").into_response(),
        (None, None) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no collection completed yet\n",
        )
            .into_response(),
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: Arc<RouterCollector>,
    registry: Arc<Registry>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    ///
    /// `registry` holds the exporter's own metrics and is appended to every
    /// scrape.
    pub fn new(
        collector: Arc<RouterCollector>,
        registry: Arc<Registry>,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> Self {
        Self {
            collector,
            registry,
            listen_addr,
            metrics_path,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            collector: self.collector.clone(),
            registry: self.registry.clone(),
            pass_lock: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(ScrapeStatus::default())),
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state(), &self.metrics_path);

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
