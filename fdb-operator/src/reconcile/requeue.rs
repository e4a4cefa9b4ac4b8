use std::time::Duration;

use crate::error::ReconcileResult;
use crate::k8s::events::OperatorEvent;
use crate::reconcile::{Pass, Signal};

/// The event reason used whenever a pass stops before completing.
pub const REASON_TERMINATED_EARLY: &str = "ReconciliationTerminatedEarly";
const ACTION_RECONCILE: &str = "Reconcile";

/// Classify the signal of the step which stopped a pass, deciding when the pass is re-run.
///
/// Errors are returned so that the controller's error policy applies. Pending signals request
/// a requeue after their delay, or the configured default, bounded by the configured maximum.
/// Either way exactly one event is published & one log line is emitted.
pub async fn handle_stop(step: &'static str, signal: Signal, pass: &Pass<'_>) -> ReconcileResult<Option<Duration>> {
    match signal {
        Signal::Continue => Ok(None),
        Signal::Retry(err) => {
            tracing::error!(step, error = %err, "error in reconciliation step");
            let event = OperatorEvent::warning(REASON_TERMINATED_EARLY, ACTION_RECONCILE, format!("{}: {}", step, err));
            pass.publish(event).await;
            Err(err)
        }
        Signal::Pending { message, delay } => {
            let delay = delay.unwrap_or_else(|| pass.config.pending_requeue()).min(pass.config.max_requeue());
            tracing::info!(step, %message, ?delay, "reconciliation terminated early");
            let event = OperatorEvent::normal(REASON_TERMINATED_EARLY, ACTION_RECONCILE, format!("{}: {}", step, message));
            pass.publish(event).await;
            Ok(Some(delay))
        }
    }
}
