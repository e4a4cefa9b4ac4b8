use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;

use crate::config::Config;
use crate::error::{ReconcileError, ReconcileResult};
use crate::k8s::admin::{AdminClient, AdminClientProvider};
use crate::k8s::events::{EventRecorder, OperatorEvent};
use crate::k8s::store::ObjectStore;
use crate::k8s::ObjectKey;
use crate::reconcile::{Pass, Reconciler};
use crate::telemetry::Telemetry;
use fdb_core::crd::{FoundationDBCluster, FoundationDBClusterSpec, FoundationDBRestore, FoundationDBRestoreSpec, RequiredMetadata};

pub const NAMESPACE: &str = "default";

/// A config suitable for tests.
pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        rust_log: "error".into(),
        http_port: 8080,
        namespace: NAMESPACE.into(),
        pod_name: "fdb-operator-0".into(),
        max_concurrent_reconciles: 1,
        pending_requeue_seconds: 10,
        max_requeue_seconds: 300,
        error_requeue_seconds: 5,
        api_timeout_seconds: 5,
        fdbcli_path: "fdbcli".into(),
        fdbrestore_path: "fdbrestore".into(),
        cluster_file_dir: "/tmp".into(),
    })
}

/// A new cluster object with the given spec.
pub fn cluster(name: &str, spec: FoundationDBClusterSpec) -> FoundationDBCluster {
    let mut cluster = FoundationDBCluster::new(name, spec);
    cluster.meta_mut().namespace = Some(NAMESPACE.into());
    cluster
}

/// A new restore object into the given destination cluster.
pub fn restore(name: &str, destination: &str) -> FoundationDBRestore {
    let mut restore = FoundationDBRestore::new(
        name,
        FoundationDBRestoreSpec {
            destination_cluster_name: destination.into(),
            backup_url: "blobstore://minio@minio-service:9000/sample-cluster?bucket=fdb-backups".into(),
            key_ranges: vec![],
            custom_parameters: vec!["knob_http_verbose_level=3".into()],
        },
    );
    restore.meta_mut().namespace = Some(NAMESPACE.into());
    restore
}

/// A cluster spec which requests only the given number of storage processes.
pub fn storage_only_spec(storage: i32) -> FoundationDBClusterSpec {
    let mut spec = FoundationDBClusterSpec::default();
    spec.process_counts.storage = storage;
    spec.process_counts.log = -1;
    spec.process_counts.stateless = -1;
    spec
}

/// An in-memory object store which enforces resourceVersion checks on writes.
#[derive(Default)]
pub struct MemoryStore {
    clusters: Mutex<BTreeMap<ObjectKey, FoundationDBCluster>>,
    restores: Mutex<BTreeMap<ObjectKey, FoundationDBRestore>>,
    /// Process groups whose resources still exist, keyed by cluster name & process group ID.
    resources: Mutex<BTreeSet<(String, String)>>,
    /// Process groups whose resources do not go away when deleted.
    stuck: Mutex<BTreeSet<(String, String)>>,
    pub status_writes: AtomicUsize,
    pub deletions: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn insert_cluster(&self, mut cluster: FoundationDBCluster) {
        cluster.meta_mut().resource_version = Some("1".into());
        self.clusters.lock().expect("lock").insert(ObjectKey::of(&cluster), cluster);
    }

    pub fn insert_restore(&self, mut restore: FoundationDBRestore) {
        restore.meta_mut().resource_version = Some("1".into());
        self.restores.lock().expect("lock").insert(ObjectKey::of(&restore), restore);
    }

    pub fn cluster(&self, name: &str) -> Option<FoundationDBCluster> {
        self.clusters.lock().expect("lock").get(&ObjectKey::new(NAMESPACE, name)).cloned()
    }

    pub fn restore(&self, name: &str) -> Option<FoundationDBRestore> {
        self.restores.lock().expect("lock").get(&ObjectKey::new(NAMESPACE, name)).cloned()
    }

    pub fn remove_cluster(&self, name: &str) {
        self.clusters.lock().expect("lock").remove(&ObjectKey::new(NAMESPACE, name));
    }

    /// Simulate an external modification of the stored cluster.
    pub fn bump_cluster_version(&self, name: &str) {
        if let Some(cluster) = self.clusters.lock().expect("lock").get_mut(&ObjectKey::new(NAMESPACE, name)) {
            bump_version(cluster);
        }
    }

    pub fn add_resources(&self, cluster: &str, process_group_id: &str, stuck: bool) {
        let key = (cluster.to_string(), process_group_id.to_string());
        if stuck {
            self.stuck.lock().expect("lock").insert(key.clone());
        }
        self.resources.lock().expect("lock").insert(key);
    }

    pub fn writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn write<K>(&self, objects: &Mutex<BTreeMap<ObjectKey, K>>, obj: &K) -> ReconcileResult<K>
    where
        K: Resource<DynamicType = ()> + RequiredMetadata + Clone,
    {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReconcileError::Timeout(std::time::Duration::from_secs(1)));
        }
        let key = ObjectKey::of(obj);
        let mut objects = objects.lock().expect("lock");
        let current = objects.get_mut(&key).ok_or_else(|| ReconcileError::Conflict {
            kind: K::kind(&()).to_string(),
            name: key.name.clone(),
        })?;
        if current.meta().resource_version != obj.meta().resource_version {
            return Err(ReconcileError::Conflict {
                kind: K::kind(&()).to_string(),
                name: key.name.clone(),
            });
        }
        let mut stored = obj.clone();
        bump_version(&mut stored);
        *current = stored.clone();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

fn bump_version<K: Resource>(obj: &mut K) {
    let version = obj.meta().resource_version.as_deref().and_then(|val| val.parse::<u64>().ok()).unwrap_or(0);
    obj.meta_mut().resource_version = Some((version + 1).to_string());
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_cluster(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBCluster>> {
        Ok(self.clusters.lock().expect("lock").get(key).cloned())
    }

    async fn update_cluster_status(&self, cluster: &FoundationDBCluster) -> ReconcileResult<FoundationDBCluster> {
        self.write(&self.clusters, cluster)
    }

    async fn get_restore(&self, key: &ObjectKey) -> ReconcileResult<Option<FoundationDBRestore>> {
        Ok(self.restores.lock().expect("lock").get(key).cloned())
    }

    async fn update_restore_status(&self, restore: &FoundationDBRestore) -> ReconcileResult<FoundationDBRestore> {
        self.write(&self.restores, restore)
    }

    async fn delete_process_group_resources(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<()> {
        self.deletions.fetch_add(1, Ordering::SeqCst);
        let key = (cluster.name().to_string(), process_group_id.to_string());
        if !self.stuck.lock().expect("lock").contains(&key) {
            self.resources.lock().expect("lock").remove(&key);
        }
        Ok(())
    }

    async fn process_group_resources_remaining(&self, cluster: &FoundationDBCluster, process_group_id: &str) -> ReconcileResult<bool> {
        let key = (cluster.name().to_string(), process_group_id.to_string());
        Ok(self.resources.lock().expect("lock").contains(&key))
    }
}

/// An event recorder which keeps every published event in memory.
#[derive(Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<(ObjectReference, OperatorEvent)>>,
    pub fail: AtomicBool,
}

impl MemoryRecorder {
    pub fn events(&self) -> Vec<OperatorEvent> {
        self.events.lock().expect("lock").iter().map(|(_, event)| event.clone()).collect()
    }

    pub fn references(&self) -> Vec<ObjectReference> {
        self.events.lock().expect("lock").iter().map(|(reference, _)| reference.clone()).collect()
    }
}

#[async_trait]
impl EventRecorder for MemoryRecorder {
    async fn publish(&self, reference: &ObjectReference, event: OperatorEvent) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("event sink unavailable");
        }
        self.events.lock().expect("lock").push((reference.clone(), event));
        Ok(())
    }
}

/// The state shared by every admin client handed out by a `FakeAdminProvider`.
#[derive(Debug, Default)]
pub struct FakeAdminState {
    pub excluded: Vec<String>,
    pub included: Vec<String>,
    /// Addresses which report as not yet safe to remove.
    pub blocked: BTreeSet<String>,
    pub restore_status: String,
    pub restores_started: Vec<String>,
    pub knobs: Vec<String>,
    pub fail_exclude: bool,
    pub clients: usize,
}

/// An admin client provider whose clients record every call in shared state.
#[derive(Default)]
pub struct FakeAdminProvider {
    pub state: Arc<Mutex<FakeAdminState>>,
}

impl FakeAdminProvider {
    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeAdminState> {
        self.state.lock().expect("lock")
    }
}

#[async_trait]
impl AdminClientProvider for FakeAdminProvider {
    async fn admin_client(&self, _cluster: &FoundationDBCluster) -> anyhow::Result<Box<dyn AdminClient>> {
        self.state().clients += 1;
        Ok(Box::new(FakeAdmin { state: self.state.clone() }))
    }
}

struct FakeAdmin {
    state: Arc<Mutex<FakeAdminState>>,
}

#[async_trait]
impl AdminClient for FakeAdmin {
    async fn exclude(&self, addresses: &[String]) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("lock");
        if state.fail_exclude {
            anyhow::bail!("could not exclude processes");
        }
        state.excluded.extend(addresses.iter().cloned());
        Ok(())
    }

    async fn include(&self, addresses: &[String]) -> anyhow::Result<()> {
        self.state.lock().expect("lock").included.extend(addresses.iter().cloned());
        Ok(())
    }

    async fn can_safely_remove(&self, addresses: &[String]) -> anyhow::Result<Vec<String>> {
        let state = self.state.lock().expect("lock");
        Ok(addresses.iter().filter(|addr| state.blocked.contains(*addr)).cloned().collect())
    }

    async fn restore_status(&self) -> anyhow::Result<String> {
        Ok(self.state.lock().expect("lock").restore_status.clone())
    }

    async fn start_restore(&self, backup_url: &str, _key_ranges: &[fdb_core::crd::KeyRange]) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("lock");
        state.restores_started.push(backup_url.to_string());
        state.restore_status = format!("restore from {} is running", backup_url);
        Ok(())
    }

    fn set_knobs(&mut self, knobs: Vec<String>) {
        self.state.lock().expect("lock").knobs = knobs;
    }
}

/// A reconciler wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub recorder: Arc<MemoryRecorder>,
    pub admin: Arc<FakeAdminProvider>,
    pub config: Arc<Config>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::default());
        let recorder = Arc::new(MemoryRecorder::default());
        let admin = Arc::new(FakeAdminProvider::default());
        let config = test_config();
        let reconciler = Reconciler::builder(config.clone())
            .store(store.clone())
            .admin_client_provider(admin.clone())
            .event_recorder(recorder.clone())
            .telemetry(Telemetry::new())
            .build()?;
        Ok(Self {
            store,
            recorder,
            admin,
            config,
            reconciler,
        })
    }

    /// Build a pass against the given object, for driving individual steps.
    pub fn pass(&self, reference: ObjectReference) -> Pass<'_> {
        self.reconciler.pass(reference, tokio_util::sync::CancellationToken::new())
    }
}
