//! Aggregation of process group state into per-class counters.

use std::collections::BTreeMap;

use crate::process_group::{ProcessClass, ProcessGroupConditionType, ProcessGroupStatus};

/// Aggregated counters over the process groups of a single cluster.
///
/// Only classes which have at least one group appear as keys. Every present class carries an
/// entry for each condition type, along with a removal and an exclusion counter, even when the
/// count is zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessGroupMetrics {
    /// The number of groups exhibiting each condition, by class.
    pub conditions: BTreeMap<ProcessClass, BTreeMap<ProcessGroupConditionType, usize>>,
    /// The number of groups marked for removal, by class.
    pub removals: BTreeMap<ProcessClass, usize>,
    /// The number of groups which have been excluded, by class.
    pub exclusions: BTreeMap<ProcessClass, usize>,
}

impl ProcessGroupMetrics {
    /// Fold the given process groups into a new set of counters.
    ///
    /// Groups marked for removal are counted on the same terms as live groups. A group with no
    /// conditions is counted as `Ready`.
    pub fn collect(groups: &[ProcessGroupStatus]) -> Self {
        let mut metrics = Self::default();
        for group in groups {
            let class = group.process_class;
            let conditions = metrics.conditions.entry(class).or_insert_with(|| {
                ProcessGroupConditionType::ALL.iter().map(|cond| (*cond, 0)).collect()
            });
            if group.process_group_conditions.is_empty() {
                *conditions.entry(ProcessGroupConditionType::Ready).or_default() += 1;
            }
            for cond in group.process_group_conditions.iter() {
                *conditions.entry(cond.condition_type).or_default() += 1;
            }

            let removals = metrics.removals.entry(class).or_default();
            if group.is_marked_for_removal() {
                *removals += 1;
            }
            let exclusions = metrics.exclusions.entry(class).or_default();
            if group.excluded {
                *exclusions += 1;
            }
        }
        metrics
    }

    /// The number of groups of the given class exhibiting the given condition.
    pub fn condition_count(&self, class: ProcessClass, condition: ProcessGroupConditionType) -> usize {
        self.conditions
            .get(&class)
            .and_then(|counts| counts.get(&condition))
            .copied()
            .unwrap_or(0)
    }
}
