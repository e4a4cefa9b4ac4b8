use anyhow::Result;

use crate::error::ModelError;
use crate::process_group::*;

#[test]
fn process_group_id_parses_unprefixed() -> Result<()> {
    let id = ProcessGroupId::parse("storage-12", None)?;
    assert!(id == ProcessGroupId::new(ProcessClass::Storage, 12), "unexpected ID parsed, got {:?}", id);

    let id = ProcessGroupId::parse("cluster-controller-1", None)?;
    assert!(
        id == ProcessGroupId::new(ProcessClass::ClusterController, 1),
        "unexpected ID parsed for multi-segment class, got {:?}",
        id
    );
    Ok(())
}

#[test]
fn process_group_id_parses_prefixed() -> Result<()> {
    let id = ProcessGroupId::parse("mycluster-log-3", Some("mycluster"))?;
    assert!(id == ProcessGroupId::new(ProcessClass::Log, 3), "unexpected ID parsed, got {:?}", id);

    let rendered = id.to_id_string(Some("mycluster"));
    assert!(rendered == "mycluster-log-3", "unexpected rendered ID, got {}", rendered);
    Ok(())
}

#[test]
fn process_group_id_rejects_malformed_input() {
    for raw in ["storage", "storage-", "storage-x", "storage-0", "widget-1", "-1"] {
        let res = ProcessGroupId::parse(raw, None);
        assert!(
            matches!(res, Err(ModelError::InvalidProcessGroupId { .. })),
            "expected parse failure for {:?}, got {:?}",
            raw,
            res
        );
    }

    let res = ProcessGroupId::parse("other-storage-1", Some("mycluster"));
    assert!(res.is_err(), "expected parse failure for mismatched prefix, got {:?}", res);
}

#[test]
fn parsed_id_rejects_class_mismatch() {
    let group = ProcessGroupStatus::new("log-1", ProcessClass::Storage, vec![]);
    let res = group.parsed_id(None);
    assert!(res.is_err(), "expected error for class mismatch, got {:?}", res);
}

#[test]
fn update_condition_adds_and_removes_without_duplicates() {
    let mut group = ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]);
    assert!(group.is_ready(), "expected a new group to be ready");

    assert!(group.update_condition(ProcessGroupConditionType::MissingProcesses, true, 100), "expected condition to be added");
    assert!(!group.update_condition(ProcessGroupConditionType::MissingProcesses, true, 200), "expected duplicate add to be a no-op");
    assert!(group.process_group_conditions.len() == 1, "expected 1 condition, got {}", group.process_group_conditions.len());
    assert!(
        group.condition_timestamp(ProcessGroupConditionType::MissingProcesses) == Some(100),
        "expected original timestamp to be retained, got {:?}",
        group.condition_timestamp(ProcessGroupConditionType::MissingProcesses)
    );
    assert!(!group.is_ready(), "expected group with a negative condition to not be ready");

    assert!(group.update_condition(ProcessGroupConditionType::MissingProcesses, false, 300), "expected condition to be removed");
    assert!(!group.update_condition(ProcessGroupConditionType::MissingProcesses, false, 300), "expected repeat removal to be a no-op");
    assert!(group.process_group_conditions.is_empty(), "expected no conditions, got {:?}", group.process_group_conditions);
}

#[test]
fn removal_and_exclusion_flags_are_idempotent() {
    let mut group = ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec![]);
    assert!(group.mark_for_removal(10), "expected first mark to change state");
    assert!(!group.mark_for_removal(20), "expected second mark to be a no-op");
    assert!(group.removal_timestamp == Some(10), "expected removal timestamp 10, got {:?}", group.removal_timestamp);

    assert!(group.mark_excluded(), "expected first exclusion to change state");
    assert!(!group.mark_excluded(), "expected second exclusion to be a no-op");
}

#[test]
fn status_serializes_with_persisted_field_names() -> Result<()> {
    let mut group = ProcessGroupStatus::new("storage-1", ProcessClass::Storage, vec!["10.1.1.1:4501".into()]);
    group.mark_for_removal(10);
    let val = serde_json::to_value(&group)?;

    assert!(val["processGroupID"] == "storage-1", "unexpected processGroupID, got {}", val["processGroupID"]);
    assert!(val["processClass"] == "storage", "unexpected processClass, got {}", val["processClass"]);
    assert!(val["remove"] == true, "unexpected remove, got {}", val["remove"]);
    assert!(val.get("excluded").is_none(), "expected false excluded flag to be omitted, got {}", val);

    let decoded: ProcessGroupStatus = serde_json::from_value(val)?;
    assert!(decoded == group, "expected decoded group to match, got {:?}", decoded);
    Ok(())
}
