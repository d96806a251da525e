//! Operator-safe failure descriptions.
//!
//! End users never see director or adapter internals. They get one generic
//! sentence plus the identifiers an operator needs to find the detailed logs,
//! which are emitted under the same `request_id`.

use std::fmt;

use fleetbroker_core::{InstanceId, OperationType, RequestId, TaskId};

/// Generic failure description shown to the marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDescription {
    service: String,
    instance_id: InstanceId,
    request_id: RequestId,
    task_id: Option<TaskId>,
    operation: Option<OperationType>,
}

impl FailureDescription {
    /// Create a description without task or operation details.
    pub fn new(service: impl Into<String>, instance_id: &InstanceId, request_id: &RequestId) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.clone(),
            request_id: request_id.clone(),
            task_id: None,
            operation: None,
        }
    }

    /// Builder method to name the failing task.
    pub fn with_task(mut self, task_id: TaskId) -> Self {
        if !task_id.is_none() {
            self.task_id = Some(task_id);
        }
        self
    }

    /// Builder method to name the operation.
    pub fn with_operation(mut self, operation: OperationType) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Correlation id quoted in the description.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl fmt::Display for FailureDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There was a problem completing your request. Please contact your operations team \
             providing the following information: service: {}, service-instance-guid: {}, \
             broker-request-id: {}",
            self.service, self.instance_id, self.request_id
        )?;
        if let Some(task_id) = self.task_id {
            write!(f, ", task-id: {}", task_id)?;
        }
        if let Some(operation) = self.operation {
            write!(f, ", operation: {}", operation)?;
        }
        Ok(())
    }
}
