//! Reconciliation of FoundationDB CRs.
//!
//! Each pass loads the current state of its target object and runs it through a fixed pipeline
//! of sub-reconcilers. Every sub-reconciler is idempotent and makes at most one status write, so
//! a pass which stops early leaves no partial state behind and is simply re-run later.

/// Unwrap the given result, else stop the current step with a retry signal.
macro_rules! try_signal {
    ($res:expr) => {
        match $res {
            Ok(val) => val,
            Err(err) => return $crate::reconcile::Signal::Retry(err.into()),
        }
    };
}

mod cluster;
#[cfg(test)]
pub(crate) mod fixtures;
mod pipeline;
mod requeue;
mod restore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ReconcileError, ReconcileResult};
use crate::k8s::admin::AdminClientProvider;
use crate::k8s::events::{EventRecorder, OperatorEvent};
use crate::k8s::store::ObjectStore;
use crate::k8s::ObjectKey;
use crate::telemetry::Telemetry;
use fdb_core::crd::{FoundationDBCluster, FoundationDBRestore};

pub use pipeline::{Outcome, Pipeline, Signal, SubReconciler};
pub use requeue::handle_stop;

/// The collaborators & runtime state available to the steps of a single pass.
pub struct Pass<'a> {
    pub store: &'a dyn ObjectStore,
    pub admin: &'a dyn AdminClientProvider,
    pub recorder: &'a dyn EventRecorder,
    pub config: &'a Config,
    /// A reference to the object being reconciled, used for events.
    pub reference: ObjectReference,
    cancellation: CancellationToken,
    timeout: Duration,
}

impl<'a> Pass<'a> {
    /// Await the given call, bounded by this pass's timeout & cancellation.
    pub async fn call<T, F>(&self, fut: F) -> ReconcileResult<T>
    where
        F: Future<Output = ReconcileResult<T>>,
    {
        bounded(&self.cancellation, self.timeout, fut).await
    }

    /// Await the given admin client call, bounded by this pass's timeout & cancellation.
    pub async fn admin_call<T, F>(&self, fut: F) -> ReconcileResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        self.call(async move { fut.await.map_err(ReconcileError::AdminClient) }).await
    }

    /// Publish an event regarding the object of this pass.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn publish(&self, event: OperatorEvent) {
        if let Err(err) = self.recorder.publish(&self.reference, event).await {
            tracing::warn!(error = ?err, "error publishing event");
        }
    }

    /// The current unix timestamp in seconds.
    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Race the given future against the cancellation token & timeout.
async fn bounded<T, F>(cancellation: &CancellationToken, timeout: Duration, fut: F) -> ReconcileResult<T>
where
    F: Future<Output = ReconcileResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(ReconcileError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => res.unwrap_or(Err(ReconcileError::Timeout(timeout))),
    }
}

/// The driver of all reconciliation passes.
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    admin: Arc<dyn AdminClientProvider>,
    recorder: Arc<dyn EventRecorder>,
    telemetry: Telemetry,
    config: Arc<Config>,
    cancellation: CancellationToken,
    clusters: Pipeline<FoundationDBCluster>,
    restores: Pipeline<FoundationDBRestore>,
}

impl Reconciler {
    /// Create a new builder.
    pub fn builder(config: Arc<Config>) -> ReconcilerBuilder {
        ReconcilerBuilder {
            config,
            store: None,
            admin: None,
            recorder: None,
            telemetry: None,
            cancellation: None,
        }
    }

    /// The telemetry registry updated by this reconciler.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Run a reconciliation pass for the given cluster.
    ///
    /// Returns the delay after which the pass should be re-run, if any.
    #[tracing::instrument(level = "info", skip(self, key), fields(kind = "FoundationDBCluster", namespace = %key.namespace, name = %key.name))]
    pub async fn reconcile_cluster(&self, key: &ObjectKey) -> ReconcileResult<Option<Duration>> {
        let cancellation = self.cancellation.child_token();
        let loaded = bounded(&cancellation, self.config.api_timeout(), self.store.get_cluster(key)).await?;
        let mut cluster = match loaded {
            Some(cluster) => cluster,
            None => {
                tracing::debug!("cluster not found, nothing to reconcile");
                self.telemetry.forget(key);
                return Ok(None);
            }
        };

        let pass = self.pass(cluster.object_ref(&()), cancellation);
        let outcome = self.clusters.run(&pass, &mut cluster).await;
        self.telemetry.observe(key, &cluster);
        self.finish(&pass, outcome).await
    }

    /// Run a reconciliation pass for the given restore.
    ///
    /// Returns the delay after which the pass should be re-run, if any.
    #[tracing::instrument(level = "info", skip(self, key), fields(kind = "FoundationDBRestore", namespace = %key.namespace, name = %key.name))]
    pub async fn reconcile_restore(&self, key: &ObjectKey) -> ReconcileResult<Option<Duration>> {
        let cancellation = self.cancellation.child_token();
        let loaded = bounded(&cancellation, self.config.api_timeout(), self.store.get_restore(key)).await?;
        let mut restore = match loaded {
            Some(restore) => restore,
            None => {
                tracing::debug!("restore not found, nothing to reconcile");
                return Ok(None);
            }
        };

        let pass = self.pass(restore.object_ref(&()), cancellation);
        let outcome = self.restores.run(&pass, &mut restore).await;
        self.finish(&pass, outcome).await
    }

    fn pass(&self, reference: ObjectReference, cancellation: CancellationToken) -> Pass<'_> {
        Pass {
            store: self.store.as_ref(),
            admin: self.admin.as_ref(),
            recorder: self.recorder.as_ref(),
            config: self.config.as_ref(),
            reference,
            cancellation,
            timeout: self.config.api_timeout(),
        }
    }

    async fn finish(&self, pass: &Pass<'_>, outcome: Outcome) -> ReconcileResult<Option<Duration>> {
        match outcome {
            Outcome::Done => {
                tracing::info!("reconciliation complete");
                Ok(None)
            }
            Outcome::Stopped { step, signal } => handle_stop(step, signal, pass).await,
        }
    }
}

/// A builder of `Reconciler` instances, which validates that every required collaborator is
/// present.
pub struct ReconcilerBuilder {
    config: Arc<Config>,
    store: Option<Arc<dyn ObjectStore>>,
    admin: Option<Arc<dyn AdminClientProvider>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    telemetry: Option<Telemetry>,
    cancellation: Option<CancellationToken>,
}

impl ReconcilerBuilder {
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn admin_client_provider(mut self, admin: Arc<dyn AdminClientProvider>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn event_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the token whose cancellation cancels all in-flight passes.
    pub fn cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> ReconcileResult<Reconciler> {
        let store = self.store.ok_or(ReconcileError::MissingCapability("object store"))?;
        let admin = self.admin.ok_or(ReconcileError::MissingCapability("admin client provider"))?;
        let recorder = self.recorder.ok_or(ReconcileError::MissingCapability("event recorder"))?;
        let (clusters, restores) = (cluster::pipeline(), restore::pipeline());
        tracing::debug!(clusters = ?clusters.step_names(), restores = ?restores.step_names(), "reconciliation pipelines built");
        Ok(Reconciler {
            store,
            admin,
            recorder,
            telemetry: self.telemetry.unwrap_or_default(),
            config: self.config,
            cancellation: self.cancellation.unwrap_or_default(),
            clusters,
            restores,
        })
    }
}
