pub mod allocation;
#[cfg(test)]
mod allocation_test;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod process_group;
#[cfg(test)]
mod process_group_test;

pub use error::ModelError;

/// The API group of all resources managed by the FoundationDB operator.
pub const FDB_API_GROUP: &str = "apps.foundationdb.org";

/// The canonical label identifying the cluster which owns a resource.
pub const LABEL_FDB_CLUSTER_NAME: &str = "foundationdb.org/fdb-cluster-name";
/// The canonical label identifying the process group which owns a resource.
pub const LABEL_FDB_PROCESS_GROUP_ID: &str = "foundationdb.org/fdb-process-group-id";
