use async_trait::async_trait;

use super::write_status;
use crate::k8s::events::OperatorEvent;
use crate::reconcile::{Pass, Signal, SubReconciler};
use fdb_core::allocation::allocate_process_groups;
use fdb_core::crd::FoundationDBCluster;

/// Creates process group records for every class which has fewer live groups than desired.
pub struct AddProcessGroups;

#[async_trait]
impl SubReconciler<FoundationDBCluster> for AddProcessGroups {
    fn name(&self) -> &'static str {
        "AddProcessGroups"
    }

    async fn reconcile(&self, pass: &Pass<'_>, cluster: &mut FoundationDBCluster) -> Signal {
        let desired = try_signal!(cluster.process_counts_with_defaults());
        let allocation = try_signal!(allocate_process_groups(
            &desired,
            cluster.process_groups(),
            &cluster.spec.process_groups_to_remove,
            cluster.process_group_id_prefix(),
        ));
        if allocation.is_empty() {
            return Signal::Continue;
        }

        let mut updated = cluster.clone();
        updated.process_groups_mut().extend(allocation.process_groups);
        try_signal!(write_status(pass, cluster, updated).await);
        for (class, count) in allocation.added {
            tracing::info!(%class, count, "added process groups");
            pass.publish(OperatorEvent::normal(
                "AddingProcesses",
                "AddProcessGroups",
                format!("Adding {} {} processes", count, class),
            ))
            .await;
        }
        Signal::Continue
    }
}
