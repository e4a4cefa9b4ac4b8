//! Cluster sub-reconcilers.

mod add_process_groups;
mod exclude;
mod remove;
mod removal_requests;

use crate::error::ReconcileResult;
use crate::reconcile::{Pass, Pipeline};
use fdb_core::crd::FoundationDBCluster;

pub use add_process_groups::AddProcessGroups;
pub use exclude::ExcludeProcessGroups;
pub use remove::RemoveProcessGroups;
pub use removal_requests::UpdateRemovalRequests;

/// The pipeline of steps run for each FoundationDBCluster.
pub fn pipeline() -> Pipeline<FoundationDBCluster> {
    Pipeline::new(vec![
        Box::new(UpdateRemovalRequests),
        Box::new(AddProcessGroups),
        Box::new(ExcludeProcessGroups),
        Box::new(RemoveProcessGroups),
    ])
}

/// Persist the status of the updated cluster, replacing the target with the stored object.
async fn write_status(pass: &Pass<'_>, target: &mut FoundationDBCluster, updated: FoundationDBCluster) -> ReconcileResult<()> {
    let stored = pass.call(pass.store.update_cluster_status(&updated)).await?;
    *target = stored;
    Ok(())
}
