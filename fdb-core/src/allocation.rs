//! Process group identity allocation.
//!
//! The allocator closes the gap between the desired and the live number of process groups of
//! each class. Indices are handed out upward from 1, skipping every index which is still
//! claimed. Groups marked for removal keep their claim until their record is deleted, so a new
//! process never collides with one which is mid-teardown.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ModelError;
use crate::process_group::{ProcessClass, ProcessGroupId, ProcessGroupStatus};

/// The output of a single allocation round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Newly created process groups, grouped by class in `ProcessClass::ALL` order.
    pub process_groups: Vec<ProcessGroupStatus>,
    /// The number of groups added for each class which needed growth.
    pub added: BTreeMap<ProcessClass, usize>,
}

impl Allocation {
    /// Check if no new groups were allocated.
    pub fn is_empty(&self) -> bool {
        self.process_groups.is_empty()
    }
}

/// Allocate new process groups for every class whose live count falls short of its desired count.
///
/// - `desired` maps each class to its target count, negative values are treated as zero.
/// - `existing` is the full set of tracked groups, including those marked for removal.
/// - `pending_removal` are IDs which have been requested for removal but may not yet be marked
/// in status. Their indices are treated as claimed. Entries which do not parse can never
/// collide with a generated ID, so they are ignored.
/// - `prefix` is the cluster's process group ID prefix.
///
/// Any existing group whose ID can not be parsed, or which shares an index with another group of
/// its class, aborts the whole allocation.
pub fn allocate_process_groups(
    desired: &BTreeMap<ProcessClass, i32>, existing: &[ProcessGroupStatus], pending_removal: &[String], prefix: Option<&str>,
) -> Result<Allocation, ModelError> {
    let mut claimed: BTreeMap<ProcessClass, BTreeSet<u32>> = BTreeMap::new();
    let mut live: BTreeMap<ProcessClass, usize> = BTreeMap::new();
    for group in existing {
        let id = group.parsed_id(prefix)?;
        if !claimed.entry(id.class).or_default().insert(id.index) {
            return Err(ModelError::invalid_id(&group.process_group_id, "index is already claimed by another process group"));
        }
        if !group.is_marked_for_removal() {
            *live.entry(id.class).or_default() += 1;
        }
    }
    for id in pending_removal.iter().filter_map(|raw| ProcessGroupId::parse(raw, prefix).ok()) {
        claimed.entry(id.class).or_default().insert(id.index);
    }

    let mut allocation = Allocation::default();
    for class in ProcessClass::ALL {
        let desired_count = desired.get(&class).copied().unwrap_or(0).max(0) as usize;
        let gap = desired_count.saturating_sub(live.get(&class).copied().unwrap_or(0));
        if gap == 0 {
            continue;
        }

        let taken = claimed.entry(class).or_default();
        let mut next = 1u32;
        for _ in 0..gap {
            while taken.contains(&next) {
                next += 1;
            }
            taken.insert(next);
            let id = ProcessGroupId::new(class, next);
            allocation
                .process_groups
                .push(ProcessGroupStatus::new(id.to_id_string(prefix), class, Vec::new()));
            next += 1;
        }
        allocation.added.insert(class, gap);
    }

    Ok(allocation)
}
