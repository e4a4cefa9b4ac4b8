//! Kubernetes controller.
//!
//! This controller watches the FoundationDBCluster & FoundationDBRestore CRs of the configured
//! namespace and drives a reconciliation pass for each object whenever it changes or its
//! requested requeue delay elapses. The kube runtime serializes passes for the same object, and
//! bounds the number of objects of each kind reconciled at once.

pub mod admin;
pub mod events;
pub mod store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::prelude::*;
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::{self, Action, Controller as KubeController};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::Resource;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconcile::Reconciler;
use fdb_core::crd::{FoundationDBCluster, FoundationDBRestore, RequiredMetadata};

/// The app name used by the operator.
pub const APP_NAME: &str = "fdb-operator";

/// The namespace & name of an object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new instance.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The key of the given object.
    pub fn of<K: RequiredMetadata>(obj: &K) -> Self {
        Self::new(obj.namespace(), obj.name())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// State shared with each reconciliation invoked by the kube runtime.
struct ControllerContext {
    reconciler: Arc<Reconciler>,
    /// The delay applied before retrying a pass which failed.
    error_requeue: Duration,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
}

/// Kubernetes controller for watching FoundationDB CRs.
pub struct Controller {
    /// K8s client.
    client: Client,
    /// Runtime config.
    config: Arc<Config>,
    /// The reconciler which drives each pass.
    reconciler: Arc<Reconciler>,
    /// A token cancelled on shutdown, which cancels any in-flight passes.
    cancellation: CancellationToken,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: broadcast::Receiver<()>,
}

impl Controller {
    /// Create a new instance.
    pub fn new(
        client: Client, config: Arc<Config>, reconciler: Arc<Reconciler>, cancellation: CancellationToken, shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            client,
            config,
            reconciler,
            cancellation,
            shutdown_rx: shutdown_tx.subscribe(),
            shutdown_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let ctx = Arc::new(ControllerContext {
            reconciler: self.reconciler.clone(),
            error_requeue: self.config.error_requeue(),
            shutdown_tx: self.shutdown_tx.clone(),
        });
        let controller_config = controller::Config::default().concurrency(self.config.max_concurrent_reconciles);

        let clusters: Api<FoundationDBCluster> = Api::namespaced(self.client.clone(), &self.config.namespace);
        let clusters_controller = KubeController::new(clusters, watcher::Config::default())
            .with_config(controller_config.clone())
            .run(reconcile_cluster, error_policy::<FoundationDBCluster>, ctx.clone())
            .for_each(|res| async move { log_controller_result("FoundationDBCluster", res) });

        let restores: Api<FoundationDBRestore> = Api::namespaced(self.client.clone(), &self.config.namespace);
        let restores_controller = KubeController::new(restores, watcher::Config::default())
            .with_config(controller_config)
            .run(reconcile_restore, error_policy::<FoundationDBRestore>, ctx)
            .for_each(|res| async move { log_controller_result("FoundationDBRestore", res) });

        tracing::info!(namespace = %self.config.namespace, "k8s controller initialized");
        tokio::select! {
            _ = future::join(clusters_controller, restores_controller) => {
                tracing::error!("k8s controller streams terminated unexpectedly, shutting down");
                let _res = self.shutdown_tx.send(());
            }
            _ = self.shutdown_rx.recv() => (),
        }

        tracing::debug!("k8s controller shutting down");
        self.cancellation.cancel();
        tracing::debug!("k8s controller shutdown");
        Ok(())
    }
}

/// Translate the output of a pass into an action for the kube runtime.
fn to_action(res: ReconcileResult<Option<Duration>>) -> ReconcileResult<Action> {
    res.map(|delay| match delay {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

async fn reconcile_cluster(cluster: Arc<FoundationDBCluster>, ctx: Arc<ControllerContext>) -> ReconcileResult<Action> {
    let key = ObjectKey::of(cluster.as_ref());
    to_action(ctx.reconciler.reconcile_cluster(&key).await)
}

async fn reconcile_restore(restore: Arc<FoundationDBRestore>, ctx: Arc<ControllerContext>) -> ReconcileResult<Action> {
    let key = ObjectKey::of(restore.as_ref());
    to_action(ctx.reconciler.reconcile_restore(&key).await)
}

/// Decide how the kube runtime should react to a failed pass.
///
/// Fatal errors trigger a graceful shutdown of the process instead of another attempt.
fn error_policy<K>(obj: Arc<K>, err: &ReconcileError, ctx: Arc<ControllerContext>) -> Action
where
    K: Resource<DynamicType = ()> + RequiredMetadata,
{
    if err.is_fatal() {
        tracing::error!(
            error = %err,
            kind = %K::kind(&()),
            namespace = obj.namespace(),
            name = obj.name(),
            "fatal reconciliation error, shutting down"
        );
        let _res = ctx.shutdown_tx.send(());
        return Action::await_change();
    }
    Action::requeue(ctx.error_requeue)
}

/// Log the result of a single pass as reported by the kube runtime.
fn log_controller_result<K>(kind: &'static str, res: Result<(ObjectRef<K>, Action), controller::Error<ReconcileError, watcher::Error>>)
where
    K: Resource,
{
    match res {
        Ok((obj, action)) => tracing::debug!(kind, name = %obj.name, ?action, "reconciliation pass finished"),
        // Already reported by the pass itself.
        Err(controller::Error::ReconcilerFailed(err, obj)) => tracing::debug!(kind, name = %obj.name, error = %err, "reconciliation pass failed"),
        Err(err) => tracing::warn!(kind, error = %err, "error from k8s controller"),
    }
}
