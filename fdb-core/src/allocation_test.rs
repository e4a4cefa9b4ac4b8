use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::allocation::allocate_process_groups;
use crate::error::ModelError;
use crate::process_group::{ProcessClass, ProcessGroupStatus};

fn removed(id: &str, class: ProcessClass) -> ProcessGroupStatus {
    let mut group = ProcessGroupStatus::new(id, class, vec![]);
    group.mark_for_removal(0);
    group
}

fn ids(groups: &[ProcessGroupStatus]) -> Vec<&str> {
    groups.iter().map(|group| group.process_group_id.as_str()).collect()
}

#[test]
fn allocation_skips_indices_reserved_by_removed_groups() -> Result<()> {
    let desired = BTreeMap::from([(ProcessClass::Storage, 3)]);
    let existing = vec![ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]), removed("storage-2", ProcessClass::Storage)];

    let output = allocate_process_groups(&desired, &existing, &[], None)?;

    assert!(ids(&output.process_groups) == vec!["storage-3", "storage-4"], "unexpected allocation, got {:?}", ids(&output.process_groups));
    assert!(output.added.get(&ProcessClass::Storage) == Some(&2), "expected 2 storage groups added, got {:?}", output.added);
    for group in output.process_groups.iter() {
        assert!(group.process_group_conditions.is_empty(), "expected no conditions on new group {}", group.process_group_id);
        assert!(!group.marked_for_removal && !group.excluded, "expected flags to be unset on new group {}", group.process_group_id);
    }
    Ok(())
}

#[test]
fn allocation_is_deterministic() -> Result<()> {
    let desired = BTreeMap::from([(ProcessClass::Storage, 4), (ProcessClass::Log, 2), (ProcessClass::Stateless, 3)]);
    let existing = vec![
        ProcessGroupStatus::new("storage-2", ProcessClass::Storage, vec![]),
        removed("log-1", ProcessClass::Log),
        ProcessGroupStatus::new("stateless-5", ProcessClass::Stateless, vec![]),
    ];

    let first = allocate_process_groups(&desired, &existing, &[], None)?;
    let second = allocate_process_groups(&desired, &existing, &[], None)?;

    assert!(first == second, "expected identical allocations, got {:?} and {:?}", first, second);
    assert!(
        ids(&first.process_groups) == vec!["storage-1", "storage-3", "storage-4", "log-2", "log-3", "stateless-1", "stateless-2"],
        "unexpected allocation order, got {:?}",
        ids(&first.process_groups)
    );
    Ok(())
}

#[test]
fn allocation_closes_the_gap_without_collisions() -> Result<()> {
    let desired = BTreeMap::from([(ProcessClass::Storage, 5), (ProcessClass::Log, 1)]);
    let existing = vec![
        ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]),
        removed("storage-3", ProcessClass::Storage),
        ProcessGroupStatus::new("storage-4", ProcessClass::Storage, vec![]),
        ProcessGroupStatus::new("log-1", ProcessClass::Log, vec![]),
        ProcessGroupStatus::new("log-2", ProcessClass::Log, vec![]),
    ];

    let output = allocate_process_groups(&desired, &existing, &[], None)?;

    let live_storage = existing.iter().filter(|g| g.process_class == ProcessClass::Storage && !g.marked_for_removal).count();
    let added_storage = output.added.get(&ProcessClass::Storage).copied().unwrap_or(0);
    assert!(live_storage + added_storage == 5, "expected storage gap to be closed, live {} added {}", live_storage, added_storage);
    assert!(output.added.get(&ProcessClass::Log).is_none(), "expected no log growth when over desired, got {:?}", output.added);

    let mut seen = BTreeSet::new();
    for group in existing.iter().chain(output.process_groups.iter()) {
        let id = group.parsed_id(None)?;
        assert!(seen.insert(id), "duplicate process group index found for {}", group.process_group_id);
    }
    Ok(())
}

#[test]
fn allocation_treats_negative_and_missing_counts_as_zero() -> Result<()> {
    let desired = BTreeMap::from([(ProcessClass::Stateless, -1)]);
    let output = allocate_process_groups(&desired, &[], &[], None)?;
    assert!(output.is_empty(), "expected no allocation, got {:?}", output);
    Ok(())
}

#[test]
fn allocation_honors_pending_removals_and_prefix() -> Result<()> {
    let desired = BTreeMap::from([(ProcessClass::Log, 2)]);
    let pending = vec!["mycluster-log-1".to_string(), "not an id".to_string()];

    let output = allocate_process_groups(&desired, &[], &pending, Some("mycluster"))?;

    assert!(
        ids(&output.process_groups) == vec!["mycluster-log-2", "mycluster-log-3"],
        "unexpected allocation, got {:?}",
        ids(&output.process_groups)
    );
    Ok(())
}

#[test]
fn allocation_aborts_on_corrupt_ids() {
    let desired = BTreeMap::from([(ProcessClass::Storage, 3)]);
    let existing = vec![ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]), ProcessGroupStatus::new("storage-abc", ProcessClass::Storage, vec![])];

    let res = allocate_process_groups(&desired, &existing, &[], None);
    assert!(matches!(res, Err(ModelError::InvalidProcessGroupId { .. })), "expected ID parse error, got {:?}", res);
}

#[test]
fn allocation_aborts_on_duplicate_indices() {
    let desired = BTreeMap::from([(ProcessClass::Storage, 3)]);
    let existing = vec![ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]), removed("storage-1", ProcessClass::Storage)];

    let res = allocate_process_groups(&desired, &existing, &[], None);
    assert!(res.is_err(), "expected duplicate index error, got {:?}", res);
}
