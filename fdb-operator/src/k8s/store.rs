//! Object storage for reconciliation.
//!
//! Status writes are merge patches which carry the resourceVersion of the object as loaded, so a
//! write against an object which has since been modified is rejected by the API server.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::client::Client;
use kube::Resource;
use maplit::btreemap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::error::{ReconcileError, ReconcileResult};
use crate::k8s::ObjectKey;
use fdb_core::crd::{FoundationDBCluster, FoundationDBRestore, RequiredMetadata};
use fdb_core::{LABEL_FDB_CLUSTER_NAME, LABEL_FDB_PROCESS_GROUP_ID};

/// Access to the objects reconciled by the operator, and the resources backing them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Load the given cluster, returning `None` if it does not exist.
    async fn get_cluster(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBCluster>>;

    /// Persist the status of the given cluster, returning the updated object.
    async fn update_cluster_status(&self, cluster: &FoundationDBCluster) -> ReconcileResult<FoundationDBCluster>;

    /// Load the given restore, returning `None` if it does not exist.
    async fn get_restore(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBRestore>>;

    /// Persist the status of the given restore, returning the updated object.
    async fn update_restore_status(&self, restore: &FoundationDBRestore) -> ReconcileResult<FoundationDBRestore>;

    /// Begin deletion of all resources backing the given process group.
    async fn delete_process_group_resources(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<()>;

    /// Check if any resources backing the given process group still exist.
    async fn process_group_resources_remaining(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<bool>;
}

/// An object store backed by the K8s API.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new instance.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get<K>(&self, key: &ObjectKey) -> ReconcileResult<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Debug + DeserializeOwned,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        api.get_opt(&key.name).await.map_err(ReconcileError::from)
    }

    async fn patch_status<K, S>(&self, obj: &K, status: &S) -> ReconcileResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + RequiredMetadata + Clone + Debug + DeserializeOwned,
        S: Serialize,
    {
        let kind = K::kind(&());
        tracing::debug!(%kind, namespace = obj.namespace(), name = obj.name(), "updating status");
        let api: Api<K> = Api::namespaced(self.client.clone(), obj.namespace());
        let patch = json!({
            "metadata": { "resourceVersion": obj.meta().resource_version },
            "status": status,
        });
        api.patch_status(obj.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| ReconcileError::from_write(&kind, obj.name(), err))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_cluster(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBCluster>> {
        self.get(key).await
    }

    async fn update_cluster_status(&self, cluster: &FoundationDBCluster) -> ReconcileResult<FoundationDBCluster> {
        self.patch_status(cluster, &cluster.status).await
    }

    async fn get_restore(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBRestore>> {
        self.get(key).await
    }

    async fn update_restore_status(&self, restore: &FoundationDBRestore) -> ReconcileResult<FoundationDBRestore> {
        self.patch_status(restore, &restore.status).await
    }

    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = cluster.name()))]
    async fn delete_process_group_resources(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<()> {
        let params = ListParams::default().labels(&process_group_selector(cluster, process_group_id));
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), cluster.namespace());
        pods.delete_collection(&DeleteParams::default(), &params).await?;
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), cluster.namespace());
        pvcs.delete_collection(&DeleteParams::default(), &params).await?;
        Ok(())
    }

    async fn process_group_resources_remaining(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<bool> {
        let params = ListParams::default().labels(&process_group_selector(cluster, process_group_id)).limit(1);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), cluster.namespace());
        if !pods.list(&params).await?.items.is_empty() {
            return Ok(true);
        }
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), cluster.namespace());
        Ok(!pvcs.list(&params).await?.items.is_empty())
    }
}

/// The label selector matching all resources of the given process group.
pub fn process_group_selector(cluster: &FoundationDBCluster, process_group_id: &str) -> String {
    let labels = btreemap! {
        LABEL_FDB_CLUSTER_NAME => cluster.name(),
        LABEL_FDB_PROCESS_GROUP_ID => process_group_id,
    };
    labels
        .iter()
        .map(|(key, val)| format!("{}={}", key, val))
        .collect::<Vec<_>>()
        .join(",")
}
