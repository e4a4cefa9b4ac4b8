//! FoundationDBCluster CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::process_group::{ProcessClass, ProcessGroupStatus};

/// CRD spec for the FoundationDBCluster resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    status = "FoundationDBClusterStatus",
    group = "apps.foundationdb.org",
    version = "v1beta1",
    kind = "FoundationDBCluster",
    namespaced,
    derive = "PartialEq",
    shortname = "fdb",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Redundancy","type":"string","jsonPath":".spec.databaseConfiguration.redundancyMode"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterSpec {
    /// The version of FoundationDB which the cluster should run.
    #[serde(default)]
    pub version: String,
    /// The number of processes to run for each process class.
    ///
    /// A zero value means that the operator should derive a default. A negative value disables
    /// the class entirely.
    #[serde(default)]
    pub process_counts: ProcessCounts,
    /// The number of processes to recruit for each role.
    #[serde(default)]
    pub role_counts: RoleCounts,
    /// The database configuration of the cluster.
    #[serde(default)]
    pub database_configuration: DatabaseConfiguration,
    /// An optional prefix prepended to every process group ID of this cluster.
    #[serde(default, rename = "processGroupIDPrefix")]
    pub process_group_id_prefix: Option<String>,
    /// The IDs of process groups which should be removed from the cluster.
    #[serde(default)]
    pub process_groups_to_remove: Vec<String>,
    /// Custom knobs to pass to the admin tooling of this cluster.
    #[serde(default)]
    pub custom_parameters: Vec<String>,
}

/// CRD status object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterStatus {
    /// The status of every process group tracked for this cluster.
    #[serde(default)]
    pub process_groups: Vec<ProcessGroupStatus>,
    /// The connection string of the cluster, once it has been configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

/// The desired number of processes for each process class.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ProcessCounts {
    #[serde(default)]
    pub storage: i32,
    #[serde(default)]
    pub log: i32,
    #[serde(default)]
    pub transaction: i32,
    #[serde(default)]
    pub stateless: i32,
    #[serde(default)]
    pub resolution: i32,
    #[serde(default)]
    pub proxy: i32,
    #[serde(default)]
    pub commit_proxy: i32,
    #[serde(default)]
    pub grv_proxy: i32,
    #[serde(default)]
    pub master: i32,
    #[serde(default)]
    pub cluster_controller: i32,
    #[serde(default)]
    pub data_distributor: i32,
    #[serde(default)]
    pub ratekeeper: i32,
    #[serde(default)]
    pub coordinator: i32,
    #[serde(default)]
    pub backup: i32,
}

impl ProcessCounts {
    /// Get the count for the given class.
    pub fn get(&self, class: ProcessClass) -> i32 {
        *self.slot(class)
    }

    /// Set the count for the given class.
    pub fn set(&mut self, class: ProcessClass, count: i32) {
        *self.slot_mut(class) = count;
    }

    /// A map of every class to its count.
    pub fn to_map(&self) -> BTreeMap<ProcessClass, i32> {
        ProcessClass::ALL.iter().map(|class| (*class, self.get(*class))).collect()
    }

    fn slot(&self, class: ProcessClass) -> &i32 {
        match class {
            ProcessClass::Storage => &self.storage,
            ProcessClass::Log => &self.log,
            ProcessClass::Transaction => &self.transaction,
            ProcessClass::Stateless => &self.stateless,
            ProcessClass::Resolution => &self.resolution,
            ProcessClass::Proxy => &self.proxy,
            ProcessClass::CommitProxy => &self.commit_proxy,
            ProcessClass::GrvProxy => &self.grv_proxy,
            ProcessClass::Master => &self.master,
            ProcessClass::ClusterController => &self.cluster_controller,
            ProcessClass::DataDistributor => &self.data_distributor,
            ProcessClass::Ratekeeper => &self.ratekeeper,
            ProcessClass::Coordinator => &self.coordinator,
            ProcessClass::Backup => &self.backup,
        }
    }

    fn slot_mut(&mut self, class: ProcessClass) -> &mut i32 {
        match class {
            ProcessClass::Storage => &mut self.storage,
            ProcessClass::Log => &mut self.log,
            ProcessClass::Transaction => &mut self.transaction,
            ProcessClass::Stateless => &mut self.stateless,
            ProcessClass::Resolution => &mut self.resolution,
            ProcessClass::Proxy => &mut self.proxy,
            ProcessClass::CommitProxy => &mut self.commit_proxy,
            ProcessClass::GrvProxy => &mut self.grv_proxy,
            ProcessClass::Master => &mut self.master,
            ProcessClass::ClusterController => &mut self.cluster_controller,
            ProcessClass::DataDistributor => &mut self.data_distributor,
            ProcessClass::Ratekeeper => &mut self.ratekeeper,
            ProcessClass::Coordinator => &mut self.coordinator,
            ProcessClass::Backup => &mut self.backup,
        }
    }
}

/// The number of processes to recruit for each role.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    #[serde(default)]
    pub storage: i32,
    #[serde(default)]
    pub logs: i32,
    #[serde(default)]
    pub proxies: i32,
    #[serde(default)]
    pub resolvers: i32,
}

/// The database configuration of a cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfiguration {
    /// The redundancy mode of the database, one of `single`, `double` or `triple`.
    ///
    /// Defaults to `double`.
    #[serde(default)]
    pub redundancy_mode: Option<String>,
}

/// The replication strategy of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedundancyMode {
    Single,
    Double,
    Triple,
}

impl RedundancyMode {
    /// The number of fault domains which may fail without data loss.
    pub fn fault_tolerance(&self) -> i32 {
        match self {
            Self::Single => 0,
            Self::Double => 1,
            Self::Triple => 2,
        }
    }

    /// The default number of log servers to recruit under this mode.
    pub fn default_logs(&self) -> i32 {
        match self {
            Self::Single => 1,
            Self::Double => 3,
            Self::Triple => 4,
        }
    }
}

impl DatabaseConfiguration {
    /// Resolve the configured redundancy mode.
    pub fn redundancy_mode(&self) -> Result<RedundancyMode, ModelError> {
        match self.redundancy_mode.as_deref() {
            None | Some("") | Some("double") => Ok(RedundancyMode::Double),
            Some("single") => Ok(RedundancyMode::Single),
            Some("triple") => Ok(RedundancyMode::Triple),
            Some(other) => Err(ModelError::InvalidConfiguration(format!("unknown redundancy mode {:?}", other))),
        }
    }
}

impl FoundationDBCluster {
    /// The process groups tracked in this cluster's status.
    pub fn process_groups(&self) -> &[ProcessGroupStatus] {
        self.status.as_ref().map(|status| status.process_groups.as_slice()).unwrap_or_default()
    }

    /// A mutable handle to this cluster's tracked process groups, initializing status as needed.
    pub fn process_groups_mut(&mut self) -> &mut Vec<ProcessGroupStatus> {
        &mut self.status.get_or_insert_with(Default::default).process_groups
    }

    /// The configured process group ID prefix, if any.
    pub fn process_group_id_prefix(&self) -> Option<&str> {
        self.spec.process_group_id_prefix.as_deref().filter(|prefix| !prefix.is_empty())
    }

    /// The role counts of this cluster with defaults applied for any unset values.
    pub fn role_counts_with_defaults(&self) -> Result<RoleCounts, ModelError> {
        let mode = self.spec.database_configuration.redundancy_mode()?;
        let mut counts = self.spec.role_counts.clone();
        if counts.storage == 0 {
            counts.storage = 2 * mode.fault_tolerance() + 1;
        }
        if counts.logs == 0 {
            counts.logs = mode.default_logs();
        }
        if counts.proxies == 0 {
            counts.proxies = 3;
        }
        if counts.resolvers == 0 {
            counts.resolvers = 1;
        }
        Ok(counts)
    }

    /// The desired number of processes per class, with defaults applied for any unset values.
    ///
    /// Explicitly negative counts are passed through untouched; consumers treat them as zero.
    pub fn process_counts_with_defaults(&self) -> Result<BTreeMap<ProcessClass, i32>, ModelError> {
        let roles = self.role_counts_with_defaults()?;
        let mut counts = self.spec.process_counts.clone();
        if counts.storage == 0 {
            counts.storage = roles.storage;
        }
        if counts.log == 0 {
            counts.log = roles.logs + 1;
        }
        if counts.stateless == 0 {
            counts.stateless = stateless_count_for_role(1, counts.master)
                + stateless_count_for_role(1, counts.cluster_controller)
                + stateless_count_for_role(roles.proxies, counts.proxy)
                + stateless_count_for_role(roles.resolvers, counts.resolution)
                + stateless_count_for_role(1, counts.ratekeeper)
                + stateless_count_for_role(1, counts.data_distributor);
        }
        Ok(counts.to_map())
    }
}

/// The number of stateless processes needed to host a role, net of any dedicated processes.
fn stateless_count_for_role(role_count: i32, dedicated: i32) -> i32 {
    (role_count - dedicated.max(0)).max(0)
}
