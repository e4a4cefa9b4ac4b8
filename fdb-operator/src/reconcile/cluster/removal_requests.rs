use std::collections::BTreeSet;

use async_trait::async_trait;

use super::write_status;
use crate::k8s::events::OperatorEvent;
use crate::reconcile::{Pass, Signal, SubReconciler};
use fdb_core::crd::FoundationDBCluster;

/// Marks the process groups requested for removal in the cluster spec.
pub struct UpdateRemovalRequests;

#[async_trait]
impl SubReconciler<FoundationDBCluster> for UpdateRemovalRequests {
    fn name(&self) -> &'static str {
        "UpdateRemovalRequests"
    }

    async fn reconcile(&self, pass: &Pass<'_>, cluster: &mut FoundationDBCluster) -> Signal {
        if cluster.spec.process_groups_to_remove.is_empty() {
            return Signal::Continue;
        }
        let requested: BTreeSet<&str> = cluster.spec.process_groups_to_remove.iter().map(String::as_str).collect();

        let now = pass.now();
        let mut updated = cluster.clone();
        let mut marked = 0;
        for group in updated.process_groups_mut().iter_mut() {
            if requested.contains(group.process_group_id.as_str()) && group.mark_for_removal(now) {
                marked += 1;
            }
        }
        if marked == 0 {
            return Signal::Continue;
        }

        tracing::info!(count = marked, "marking process groups for removal");
        try_signal!(write_status(pass, cluster, updated).await);
        pass.publish(OperatorEvent::normal(
            "MarkedForRemoval",
            "UpdateRemovalRequests",
            format!("Marked {} process groups for removal", marked),
        ))
        .await;
        Signal::Continue
    }
}
