use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::k8s::admin::FdbCliAdminProvider;
use crate::k8s::events::KubeEventRecorder;
use crate::k8s::store::KubeStore;
use crate::k8s::{Controller, APP_NAME};
use crate::reconcile::Reconciler;
use crate::server::HttpServer;
use crate::telemetry::Telemetry;

/// The application object of the operator.
pub struct App {
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the HTTP server.
    server: JoinHandle<()>,
    /// The join handle of the K8s controller.
    controller: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>, metrics: PrometheusHandle) -> Result<Self> {
        // App shutdown channel.
        let (shutdown_tx, shutdown_rx) = broadcast::channel(10);
        let cancellation = CancellationToken::new();

        // Initialize K8s client.
        let client = kube::Client::try_default().await.context("error initializing K8s client")?;

        let reconciler = Reconciler::builder(config.clone())
            .store(Arc::new(KubeStore::new(client.clone())))
            .admin_client_provider(Arc::new(FdbCliAdminProvider::new(config.clone())))
            .event_recorder(Arc::new(KubeEventRecorder::new(client.clone(), APP_NAME, &config.pod_name)))
            .telemetry(Telemetry::new())
            .cancellation(cancellation.clone())
            .build()
            .context("error building reconciler")?;

        // Spawn various core tasks.
        let server = HttpServer::new(config.clone(), metrics, shutdown_tx.clone())
            .spawn()
            .await
            .context("error setting up http server")?;
        let controller = Controller::new(client, config, Arc::new(reconciler), cancellation, shutdown_tx.clone()).spawn();

        Ok(Self {
            shutdown_rx: BroadcastStream::new(shutdown_rx),
            shutdown_tx,
            server,
            controller,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("FoundationDB operator is shutting down");
        if let Err(err) = self.server.await {
            tracing::error!(error = ?err, "error joining http server task");
        }
        if let Err(err) = self.controller.await.context("error joining k8s controller handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down k8s controller");
        }

        tracing::debug!("FoundationDB operator shutdown complete");
        Ok(())
    }
}
