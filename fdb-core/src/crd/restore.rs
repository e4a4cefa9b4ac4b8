//! FoundationDBRestore CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CRD spec for the FoundationDBRestore resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    status = "FoundationDBRestoreStatus",
    group = "apps.foundationdb.org",
    version = "v1beta1",
    kind = "FoundationDBRestore",
    namespaced,
    derive = "PartialEq",
    shortname = "fdbrestore",
    printcolumn = r#"{"name":"Destination","type":"string","jsonPath":".spec.destinationClusterName"}"#,
    printcolumn = r#"{"name":"Running","type":"boolean","jsonPath":".status.running"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBRestoreSpec {
    /// The name of the cluster, in the same namespace, which the backup is restored into.
    pub destination_cluster_name: String,
    /// The URL of the backup to restore from.
    #[serde(rename = "backupURL")]
    pub backup_url: String,
    /// The key ranges to restore. An empty list restores the entire keyspace.
    #[serde(default)]
    pub key_ranges: Vec<KeyRange>,
    /// Custom knobs to pass to the restore tooling.
    #[serde(default)]
    pub custom_parameters: Vec<String>,
}

/// CRD status object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
pub struct FoundationDBRestoreStatus {
    /// Indicates that the restore has been started.
    #[serde(default)]
    pub running: bool,
}

/// A range of keys, inclusive of `start` and exclusive of `end`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
pub struct KeyRange {
    pub start: String,
    pub end: String,
}

impl FoundationDBRestore {
    /// Check if this restore has been recorded as running.
    pub fn is_running(&self) -> bool {
        self.status.as_ref().map(|status| status.running).unwrap_or(false)
    }
}
