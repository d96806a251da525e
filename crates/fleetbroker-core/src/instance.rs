//! Service instance records as seen by the marketplace registry.

use serde::{Deserialize, Serialize};

use crate::InstanceId;

/// A service instance known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Instance identifier.
    pub guid: InstanceId,

    /// Plan the instance is on.
    pub plan_id: String,
}

/// Registry view of an instance used before starting an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceState {
    /// Current plan.
    pub plan_id: String,

    /// Whether the registry believes an operation is running.
    pub operation_in_progress: bool,
}

/// Last operation the registry recorded for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryLastOperation {
    /// Operation type as reported ("create", "update", "delete").
    #[serde(rename = "type")]
    pub operation_type: String,

    /// Operation state as reported ("in progress", "succeeded", "failed").
    pub state: String,
}

impl RegistryLastOperation {
    /// Returns true if the registry is still waiting on this operation.
    pub fn is_in_progress(&self) -> bool {
        self.state == "in progress"
    }
}

/// Registry record for a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Current plan.
    pub plan_id: String,

    /// Most recent operation, if the registry tracked one.
    pub last_operation: Option<RegistryLastOperation>,
}

impl InstanceRecord {
    /// Returns true if an operation is running against the instance.
    pub fn operation_in_progress(&self) -> bool {
        self.last_operation
            .as_ref()
            .is_some_and(RegistryLastOperation::is_in_progress)
    }
}

/// Optional narrowing of instance enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Only instances in this organization.
    pub org_name: Option<String>,

    /// Only instances in this space (requires `org_name`).
    pub space_name: Option<String>,
}

impl InstanceFilter {
    /// Returns true if no narrowing applies.
    pub fn is_empty(&self) -> bool {
        self.org_name.is_none() && self.space_name.is_none()
    }
}
