use std::collections::BTreeSet;

use async_trait::async_trait;

use super::write_status;
use crate::k8s::events::OperatorEvent;
use crate::reconcile::{Pass, Signal, SubReconciler};
use fdb_core::crd::FoundationDBCluster;

/// Tears down the resources of excluded process groups, and drops their records once those
/// resources are gone.
pub struct RemoveProcessGroups;

#[async_trait]
impl SubReconciler<FoundationDBCluster> for RemoveProcessGroups {
    fn name(&self) -> &'static str {
        "RemoveProcessGroups"
    }

    async fn reconcile(&self, pass: &Pass<'_>, cluster: &mut FoundationDBCluster) -> Signal {
        let candidates: Vec<(String, Vec<String>)> = cluster
            .process_groups()
            .iter()
            .filter(|group| group.is_marked_for_removal() && group.excluded)
            .map(|group| (group.process_group_id.clone(), group.addresses.clone()))
            .collect();
        if candidates.is_empty() {
            return Signal::Continue;
        }

        let mut removed = BTreeSet::new();
        let mut addresses = Vec::new();
        let mut terminating = 0;
        for (id, group_addresses) in candidates {
            try_signal!(pass.call(pass.store.delete_process_group_resources(cluster, &id)).await);
            if try_signal!(pass.call(pass.store.process_group_resources_remaining(cluster, &id)).await) {
                tracing::debug!(process_group = %id, "process group resources are still terminating");
                terminating += 1;
                continue;
            }
            addresses.extend(group_addresses);
            removed.insert(id);
        }

        if !removed.is_empty() {
            // Addresses must be included before their records are dropped.
            if !addresses.is_empty() {
                let admin = try_signal!(pass.admin_call(pass.admin.admin_client(cluster)).await);
                try_signal!(pass.admin_call(admin.include(&addresses)).await);
            }
            let mut updated = cluster.clone();
            updated.process_groups_mut().retain(|group| !removed.contains(&group.process_group_id));
            tracing::info!(count = removed.len(), "removing process groups");
            try_signal!(write_status(pass, cluster, updated).await);
            pass.publish(OperatorEvent::normal(
                "RemovingProcesses",
                "RemoveProcessGroups",
                format!("Removed {} process groups", removed.len()),
            ))
            .await;
        }

        if terminating > 0 {
            return Signal::pending("waiting for process group resources to terminate");
        }
        Signal::Continue
    }
}
