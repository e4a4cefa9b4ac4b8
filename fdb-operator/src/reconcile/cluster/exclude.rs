use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use super::write_status;
use crate::reconcile::{Pass, Signal, SubReconciler};
use fdb_core::crd::FoundationDBCluster;

/// The delay before re-checking exclusions which have not yet completed.
const EXCLUSION_RECHECK_DELAY: Duration = Duration::from_secs(15);

/// Excludes the processes of groups marked for removal, and records which of them the cluster
/// has confirmed are safe to remove.
///
/// A group with no recorded addresses never ran a process, so it holds no data and is marked
/// as excluded without consulting the cluster.
pub struct ExcludeProcessGroups;

#[async_trait]
impl SubReconciler<FoundationDBCluster> for ExcludeProcessGroups {
    fn name(&self) -> &'static str {
        "ExcludeProcessGroups"
    }

    async fn reconcile(&self, pass: &Pass<'_>, cluster: &mut FoundationDBCluster) -> Signal {
        let pending: Vec<(String, Vec<String>)> = cluster
            .process_groups()
            .iter()
            .filter(|group| group.is_marked_for_removal() && !group.excluded)
            .map(|group| (group.process_group_id.clone(), group.addresses.clone()))
            .collect();
        if pending.is_empty() {
            return Signal::Continue;
        }

        let addresses: Vec<String> = pending.iter().flat_map(|(_, addresses)| addresses.iter().cloned()).collect();
        let blocked: BTreeSet<String> = if addresses.is_empty() {
            BTreeSet::new()
        } else {
            let admin = try_signal!(pass.admin_call(pass.admin.admin_client(cluster)).await);
            tracing::info!(?addresses, "excluding processes");
            try_signal!(pass.admin_call(admin.exclude(&addresses)).await);
            try_signal!(pass.admin_call(admin.can_safely_remove(&addresses)).await).into_iter().collect()
        };

        let safe: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, addresses)| addresses.iter().all(|addr| !blocked.contains(addr)))
            .map(|(id, _)| id.as_str())
            .collect();
        let remaining = pending.len() - safe.len();

        if !safe.is_empty() {
            let mut updated = cluster.clone();
            for group in updated.process_groups_mut().iter_mut() {
                if safe.contains(group.process_group_id.as_str()) {
                    group.mark_excluded();
                }
            }
            tracing::info!(count = safe.len(), "marking process groups as excluded");
            try_signal!(write_status(pass, cluster, updated).await);
        }

        if remaining > 0 {
            return Signal::pending_for(format!("waiting for exclusion of {} process groups", remaining), EXCLUSION_RECHECK_DELAY);
        }
        Signal::Continue
    }
}
