//! HTTP server for health checks & Prometheus metrics scraping.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// The operator's HTTP server.
pub struct HttpServer {
    /// The application's runtime config.
    config: Arc<Config>,
    /// A handle used to render the metrics of the global recorder.
    metrics: PrometheusHandle,

    /// A channel used for triggering graceful shutdown.
    shutdown: broadcast::Sender<()>,
}

impl HttpServer {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, metrics: PrometheusHandle, shutdown: broadcast::Sender<()>) -> Self {
        Self { config, metrics, shutdown }
    }

    /// Bind the server's listener & spawn it.
    ///
    /// Any error from the running server triggers a graceful shutdown of the application.
    pub async fn spawn(self) -> Result<JoinHandle<()>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = TcpListener::bind(addr).await.context("error binding http listener")?;
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/metrics", get(prom_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(self.metrics);

        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!(port = self.config.http_port, "http server is listening");
        Ok(tokio::spawn(async move {
            let res = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _res = shutdown_rx.recv().await;
                })
                .await;
            if let Err(err) = res {
                tracing::error!(error = ?err, "error from http server, shutting down");
                let _res = shutdown.send(());
            }
        }))
    }
}

/// Handler for serving Prometheus metrics.
async fn prom_metrics(State(handle): State<PrometheusHandle>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static("text/plain; version=0.0.4"));
    (StatusCode::OK, headers, handle.render())
}
