//! Restore sub-reconcilers.

use async_trait::async_trait;

use crate::k8s::admin::knobs_for_cli;
use crate::k8s::events::OperatorEvent;
use crate::k8s::ObjectKey;
use crate::reconcile::{Pass, Pipeline, Signal, SubReconciler};
use fdb_core::crd::{FoundationDBRestore, FoundationDBRestoreStatus, RequiredMetadata};

/// The pipeline of steps run for each FoundationDBRestore.
pub fn pipeline() -> Pipeline<FoundationDBRestore> {
    Pipeline::new(vec![Box::new(StartRestore)])
}

/// Starts the restore into its destination cluster, if no restore is running there yet.
pub struct StartRestore;

#[async_trait]
impl SubReconciler<FoundationDBRestore> for StartRestore {
    fn name(&self) -> &'static str {
        "StartRestore"
    }

    async fn reconcile(&self, pass: &Pass<'_>, restore: &mut FoundationDBRestore) -> Signal {
        let key = ObjectKey::new(restore.namespace(), &restore.spec.destination_cluster_name);
        let cluster = match try_signal!(pass.call(pass.store.get_cluster(&key)).await) {
            Some(cluster) => cluster,
            None => return Signal::pending(format!("waiting for destination cluster {}", key)),
        };

        let mut admin = try_signal!(pass.admin_call(pass.admin.admin_client(&cluster)).await);
        admin.set_knobs(knobs_for_cli(&restore.spec.custom_parameters));
        let status = try_signal!(pass.admin_call(admin.restore_status()).await);
        if status.trim().is_empty() {
            tracing::info!(backup_url = %restore.spec.backup_url, "starting restore");
            try_signal!(pass.admin_call(admin.start_restore(&restore.spec.backup_url, &restore.spec.key_ranges)).await);
            pass.publish(OperatorEvent::normal(
                "StartingRestore",
                "StartRestore",
                format!("Started restore from {}", restore.spec.backup_url),
            ))
            .await;
        }

        if !restore.is_running() {
            let mut updated = restore.clone();
            updated.status.get_or_insert_with(FoundationDBRestoreStatus::default).running = true;
            *restore = try_signal!(pass.call(pass.store.update_restore_status(&updated)).await);
        }
        Signal::Continue
    }
}
