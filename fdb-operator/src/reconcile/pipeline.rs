use std::time::Duration;

use async_trait::async_trait;

use crate::error::ReconcileError;
use crate::reconcile::Pass;

/// The signal returned by a step to control the rest of its pass.
#[derive(Debug)]
pub enum Signal {
    /// The step is satisfied, continue to the next step.
    Continue,
    /// The step failed, stop the pass and retry it via the error policy.
    Retry(ReconcileError),
    /// The step is waiting on a condition which is not yet met, stop the pass and re-run it later.
    Pending { message: String, delay: Option<Duration> },
}

impl Signal {
    /// A pending signal which uses the default requeue delay.
    pub fn pending(message: impl Into<String>) -> Self {
        Self::Pending {
            message: message.into(),
            delay: None,
        }
    }

    /// A pending signal which requests re-running the pass after the given delay.
    pub fn pending_for(message: impl Into<String>, delay: Duration) -> Self {
        Self::Pending {
            message: message.into(),
            delay: Some(delay),
        }
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// The outcome of running a pipeline.
#[derive(Debug)]
pub enum Outcome {
    /// Every step continued.
    Done,
    /// The named step stopped the pass with the given signal.
    Stopped { step: &'static str, signal: Signal },
}

/// A single idempotent unit of reconciliation work.
#[async_trait]
pub trait SubReconciler<K: Send + Sync>: Send + Sync {
    /// The name of this step, used in logs & events.
    fn name(&self) -> &'static str;

    /// Reconcile the given target.
    ///
    /// Steps which persist changes must replace the target with the object returned from the
    /// store, so that later steps observe its latest resourceVersion.
    async fn reconcile(&self, pass: &Pass<'_>, target: &mut K) -> Signal;
}

/// An ordered sequence of steps run against a single object.
pub struct Pipeline<K: Send + Sync> {
    steps: Vec<Box<dyn SubReconciler<K>>>,
}

impl<K: Send + Sync> Pipeline<K> {
    /// Create a new instance from the given steps, which are run in order.
    pub fn new(steps: Vec<Box<dyn SubReconciler<K>>>) -> Self {
        Self { steps }
    }

    /// The names of the steps of this pipeline, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run each step in order, stopping at the first step which does not continue.
    pub async fn run(&self, pass: &Pass<'_>, target: &mut K) -> Outcome {
        for step in self.steps.iter() {
            tracing::debug!(step = step.name(), "running reconciliation step");
            let signal = step.reconcile(pass, target).await;
            if !signal.is_continue() {
                return Outcome::Stopped { step: step.name(), signal };
            }
        }
        Outcome::Done
    }
}
