//! Process group state model.
//!
//! A process group is one worker process slot of a FoundationDB cluster. Each group is
//! identified by its process class and a numeric index which is unique within that class. The
//! status record of every group is persisted in the owning cluster's status sub-resource.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The role which a worker process plays in the cluster.
///
/// The derived ordering follows declaration order, which is also the order of `ProcessClass::ALL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessClass {
    Storage,
    Log,
    Transaction,
    Stateless,
    Resolution,
    Proxy,
    CommitProxy,
    GrvProxy,
    Master,
    ClusterController,
    DataDistributor,
    Ratekeeper,
    Coordinator,
    Backup,
}

impl ProcessClass {
    /// All process classes, in stable iteration order.
    pub const ALL: [ProcessClass; 14] = [
        Self::Storage,
        Self::Log,
        Self::Transaction,
        Self::Stateless,
        Self::Resolution,
        Self::Proxy,
        Self::CommitProxy,
        Self::GrvProxy,
        Self::Master,
        Self::ClusterController,
        Self::DataDistributor,
        Self::Ratekeeper,
        Self::Coordinator,
        Self::Backup,
    ];

    /// The canonical name of this class, as used by FoundationDB.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Log => "log",
            Self::Transaction => "transaction",
            Self::Stateless => "stateless",
            Self::Resolution => "resolution",
            Self::Proxy => "proxy",
            Self::CommitProxy => "commit_proxy",
            Self::GrvProxy => "grv_proxy",
            Self::Master => "master",
            Self::ClusterController => "cluster_controller",
            Self::DataDistributor => "data_distributor",
            Self::Ratekeeper => "ratekeeper",
            Self::Coordinator => "coordinator",
            Self::Backup => "backup",
        }
    }

    /// The form of this class used in process group IDs and pod names.
    ///
    /// Underscores are not valid in K8s object names, so they are replaced with hyphens.
    pub fn pod_name(&self) -> String {
        self.as_str().replace('_', "-")
    }

    /// Resolve a class from the form produced by `pod_name`.
    pub fn from_pod_name(val: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|class| class.pod_name() == val)
    }
}

impl fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessClass {
    type Err = ModelError;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == val)
            .ok_or_else(|| ModelError::InvalidConfiguration(format!("unknown process class {:?}", val)))
    }
}

/// The composite identity of a process group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessGroupId {
    /// The class of the process group.
    pub class: ProcessClass,
    /// The index of the process group, unique within its class and always positive.
    pub index: u32,
}

impl ProcessGroupId {
    /// Create a new instance.
    pub fn new(class: ProcessClass, index: u32) -> Self {
        Self { class, index }
    }

    /// Parse a process group ID of the form `[{prefix}-]{class}-{index}`.
    ///
    /// When a prefix is given, the ID must begin with that prefix followed by a hyphen.
    pub fn parse(raw: &str, prefix: Option<&str>) -> Result<Self, ModelError> {
        let unprefixed = match prefix.filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => raw
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('-'))
                .ok_or_else(|| ModelError::invalid_id(raw, format!("expected prefix {:?}", prefix)))?,
            None => raw,
        };
        let (class_str, index_str) = unprefixed
            .rsplit_once('-')
            .ok_or_else(|| ModelError::invalid_id(raw, "expected a `{class}-{index}` suffix"))?;
        let index: u32 = index_str
            .parse()
            .map_err(|_| ModelError::invalid_id(raw, format!("index {:?} is not a number", index_str)))?;
        if index == 0 {
            return Err(ModelError::invalid_id(raw, "index must be positive"));
        }
        let class = ProcessClass::from_pod_name(class_str).ok_or_else(|| ModelError::invalid_id(raw, format!("unknown process class {:?}", class_str)))?;
        Ok(Self { class, index })
    }

    /// Render this ID, including the given prefix if any.
    pub fn to_id_string(&self, prefix: Option<&str>) -> String {
        match prefix.filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => format!("{}-{}", prefix, self),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ProcessGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.class.pod_name(), self.index)
    }
}

/// A condition which a process group may exhibit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ProcessGroupConditionType {
    IncorrectPodSpec,
    IncorrectConfigMap,
    IncorrectCommandLine,
    PodFailing,
    MissingPod,
    MissingPVC,
    MissingService,
    MissingProcesses,
    SidecarUnreachable,
    PodPending,
    /// Synthetic condition for a group with no negative conditions.
    Ready,
}

impl ProcessGroupConditionType {
    /// All condition types.
    pub const ALL: [ProcessGroupConditionType; 11] = [
        Self::IncorrectPodSpec,
        Self::IncorrectConfigMap,
        Self::IncorrectCommandLine,
        Self::PodFailing,
        Self::MissingPod,
        Self::MissingPVC,
        Self::MissingService,
        Self::MissingProcesses,
        Self::SidecarUnreachable,
        Self::PodPending,
        Self::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncorrectPodSpec => "IncorrectPodSpec",
            Self::IncorrectConfigMap => "IncorrectConfigMap",
            Self::IncorrectCommandLine => "IncorrectCommandLine",
            Self::PodFailing => "PodFailing",
            Self::MissingPod => "MissingPod",
            Self::MissingPVC => "MissingPVC",
            Self::MissingService => "MissingService",
            Self::MissingProcesses => "MissingProcesses",
            Self::SidecarUnreachable => "SidecarUnreachable",
            Self::PodPending => "PodPending",
            Self::Ready => "Ready",
        }
    }
}

impl fmt::Display for ProcessGroupConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped condition of a process group.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ProcessGroupCondition {
    /// The type of this condition.
    #[serde(rename = "type")]
    pub condition_type: ProcessGroupConditionType,
    /// The unix timestamp, in seconds, at which this condition was first observed.
    pub timestamp: i64,
}

/// The persisted status of a single process group.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupStatus {
    /// The raw ID of this process group.
    ///
    /// This is kept in its raw form and parsed on demand, so that a corrupt ID surfaces as an
    /// error instead of failing deserialization of the entire cluster object.
    #[serde(rename = "processGroupID")]
    pub process_group_id: String,
    /// The class of this process group.
    pub process_class: ProcessClass,
    /// The network addresses last observed for this process group's processes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    /// Indicates that this process group is being decommissioned.
    #[serde(default, rename = "remove", skip_serializing_if = "std::ops::Not::not")]
    pub marked_for_removal: bool,
    /// The unix timestamp, in seconds, at which this group was marked for removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_timestamp: Option<i64>,
    /// Indicates that the cluster has confirmed this group holds no data and is safe to remove.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded: bool,
    /// The set of conditions currently exhibited by this process group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_group_conditions: Vec<ProcessGroupCondition>,
}

impl ProcessGroupStatus {
    /// Create a new process group with no conditions which is neither removed nor excluded.
    pub fn new(process_group_id: impl Into<String>, process_class: ProcessClass, addresses: Vec<String>) -> Self {
        Self {
            process_group_id: process_group_id.into(),
            process_class,
            addresses,
            marked_for_removal: false,
            removal_timestamp: None,
            excluded: false,
            process_group_conditions: Vec::new(),
        }
    }

    /// Parse this group's ID, verifying that it agrees with the recorded process class.
    pub fn parsed_id(&self, prefix: Option<&str>) -> Result<ProcessGroupId, ModelError> {
        let id = ProcessGroupId::parse(&self.process_group_id, prefix)?;
        if id.class != self.process_class {
            return Err(ModelError::invalid_id(
                &self.process_group_id,
                format!("ID class {} does not match recorded process class {}", id.class, self.process_class),
            ));
        }
        Ok(id)
    }

    /// Check if this group is marked for removal.
    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    /// Mark this group for removal, returning `true` if it was not already marked.
    pub fn mark_for_removal(&mut self, now: i64) -> bool {
        if self.marked_for_removal {
            return false;
        }
        self.marked_for_removal = true;
        self.removal_timestamp = Some(now);
        true
    }

    /// Mark this group as excluded, returning `true` if it was not already excluded.
    pub fn mark_excluded(&mut self) -> bool {
        !std::mem::replace(&mut self.excluded, true)
    }

    /// Check if this group currently exhibits the given condition.
    pub fn has_condition(&self, condition_type: ProcessGroupConditionType) -> bool {
        self.process_group_conditions.iter().any(|cond| cond.condition_type == condition_type)
    }

    /// The time at which the given condition was first observed, if present.
    pub fn condition_timestamp(&self, condition_type: ProcessGroupConditionType) -> Option<i64> {
        self.process_group_conditions
            .iter()
            .find(|cond| cond.condition_type == condition_type)
            .map(|cond| cond.timestamp)
    }

    /// Add or remove the given condition, returning `true` if the condition set changed.
    ///
    /// An already present condition keeps its original timestamp.
    pub fn update_condition(&mut self, condition_type: ProcessGroupConditionType, present: bool, now: i64) -> bool {
        let exists = self.has_condition(condition_type);
        match (present, exists) {
            (true, false) => {
                self.process_group_conditions.push(ProcessGroupCondition { condition_type, timestamp: now });
                true
            }
            (false, true) => {
                self.process_group_conditions.retain(|cond| cond.condition_type != condition_type);
                true
            }
            _ => false,
        }
    }

    /// Check if this group has no conditions other than `Ready`.
    pub fn is_ready(&self) -> bool {
        self.process_group_conditions
            .iter()
            .all(|cond| cond.condition_type == ProcessGroupConditionType::Ready)
    }
}
