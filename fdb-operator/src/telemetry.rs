//! Process group telemetry.
//!
//! The latest aggregated metrics of every reconciled cluster are kept in a snapshot map for
//! lock-free reads, and are exported as Prometheus gauges.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics::{describe_gauge, gauge, Label};

use crate::k8s::ObjectKey;
use fdb_core::crd::FoundationDBCluster;
use fdb_core::metrics::ProcessGroupMetrics;
use fdb_core::process_group::{ProcessClass, ProcessGroupConditionType};

pub(crate) const METRIC_PROCESS_GROUP_TOTAL: &str = "fdb_operator_process_group_total";
pub(crate) const METRIC_PROCESS_GROUP_MARKED_REMOVAL: &str = "fdb_operator_process_group_marked_removal";
pub(crate) const METRIC_PROCESS_GROUP_MARKED_EXCLUDED: &str = "fdb_operator_process_group_marked_excluded";

/// A read-only snapshot of the latest metrics of each cluster.
pub type TelemetrySnapshot = Arc<BTreeMap<ObjectKey, Arc<ProcessGroupMetrics>>>;

/// Register the descriptions of all process group metrics.
pub fn register_metrics() {
    describe_gauge!(METRIC_PROCESS_GROUP_TOTAL, "the number of process groups of each class exhibiting each condition");
    describe_gauge!(METRIC_PROCESS_GROUP_MARKED_REMOVAL, "the number of process groups of each class marked for removal");
    describe_gauge!(METRIC_PROCESS_GROUP_MARKED_EXCLUDED, "the number of process groups of each class which have been excluded");
}

/// A registry of the latest process group metrics of each cluster.
#[derive(Clone, Default)]
pub struct Telemetry {
    snapshots: Arc<ArcSwap<BTreeMap<ObjectKey, Arc<ProcessGroupMetrics>>>>,
}

impl Telemetry {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of the latest metrics of every cluster.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshots.load_full()
    }

    /// Record the current process group state of the given cluster.
    pub fn observe(&self, key: &ObjectKey, cluster: &FoundationDBCluster) {
        let metrics = Arc::new(ProcessGroupMetrics::collect(cluster.process_groups()));
        let previous = self.snapshot().get(key).cloned();
        export(key, &metrics, previous.as_deref());
        self.snapshots.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.insert(key.clone(), metrics.clone());
            next
        });
    }

    /// Drop the metrics of a cluster which no longer exists.
    pub fn forget(&self, key: &ObjectKey) {
        let previous = match self.snapshot().get(key).cloned() {
            Some(previous) => previous,
            None => return,
        };
        export(key, &ProcessGroupMetrics::default(), Some(&previous));
        self.snapshots.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.remove(key);
            next
        });
    }
}

/// A single gauge value to export.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GaugeUpdate {
    pub name: &'static str,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

/// Export the given metrics as gauges.
fn export(key: &ObjectKey, metrics: &ProcessGroupMetrics, previous: Option<&ProcessGroupMetrics>) {
    for update in gauge_updates(key, metrics, previous) {
        let labels: Vec<Label> = update.labels.into_iter().map(|(name, val)| Label::new(name, val)).collect();
        gauge!(update.name, labels).set(update.value);
    }
}

/// The gauge values which reflect the given metrics, zeroing any class which was previously
/// exported but is no longer present.
pub(crate) fn gauge_updates(key: &ObjectKey, metrics: &ProcessGroupMetrics, previous: Option<&ProcessGroupMetrics>) -> Vec<GaugeUpdate> {
    let empty = ProcessGroupMetrics::default();
    let previous = previous.unwrap_or(&empty);
    let labels = |class: ProcessClass| {
        vec![
            ("namespace", key.namespace.clone()),
            ("name", key.name.clone()),
            ("process_class", class.as_str().to_string()),
        ]
    };
    let condition_update = |class: ProcessClass, condition: ProcessGroupConditionType, count: usize| {
        let mut labels = labels(class);
        labels.push(("condition", condition.as_str().to_string()));
        GaugeUpdate {
            name: METRIC_PROCESS_GROUP_TOTAL,
            labels,
            value: count as f64,
        }
    };

    let mut updates = Vec::new();
    for (class, counts) in previous.conditions.iter().filter(|(class, _)| !metrics.conditions.contains_key(*class)) {
        updates.extend(counts.keys().map(|condition| condition_update(*class, *condition, 0)));
    }
    for (class, counts) in metrics.conditions.iter() {
        updates.extend(counts.iter().map(|(condition, count)| condition_update(*class, *condition, *count)));
    }

    let classes = previous.removals.keys().chain(metrics.removals.keys()).copied().collect::<BTreeSet<ProcessClass>>();
    for class in classes {
        updates.push(GaugeUpdate {
            name: METRIC_PROCESS_GROUP_MARKED_REMOVAL,
            labels: labels(class),
            value: metrics.removals.get(&class).copied().unwrap_or(0) as f64,
        });
        updates.push(GaugeUpdate {
            name: METRIC_PROCESS_GROUP_MARKED_EXCLUDED,
            labels: labels(class),
            value: metrics.exclusions.get(&class).copied().unwrap_or(0) as f64,
        });
    }
    updates
}
