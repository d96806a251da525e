//! Last-operation resolution.
//!
//! Turns the director's view of an instance's tasks into the three-state
//! result the marketplace polls for. Nothing is cached: every call re-reads
//! the director, and every call gets its own request id so the operator-safe
//! failure description can be matched with the detailed log lines.

use tracing::{info, warn};

use fleetbroker_clients::Director;
use fleetbroker_core::{
    deployment_name, InstanceId, LastOperation, OperationMetadata, OperationType, RemoteTask,
    RequestId, TaskId, TaskState,
};

use crate::config::ServiceCatalog;
use crate::error::BrokerError;
use crate::failure::FailureDescription;
use crate::sequencer::ErrandSequencer;

/// Resolves last-operation polls against the director.
pub struct LastOperationResolver<'a> {
    director: &'a dyn Director,
    catalog: &'a ServiceCatalog,
}

impl<'a> LastOperationResolver<'a> {
    /// Create a new resolver.
    pub fn new(director: &'a dyn Director, catalog: &'a ServiceCatalog) -> Self {
        Self { director, catalog }
    }

    /// Resolve the state of the operation described by `metadata`.
    pub async fn resolve(
        &self,
        instance_id: &InstanceId,
        metadata: &OperationMetadata,
    ) -> Result<LastOperation, BrokerError> {
        let report = Report::new(self.catalog, instance_id, metadata.operation_type);

        if let Some(context_id) = &metadata.context_id {
            return ErrandSequencer::new(self.director, self.catalog)
                .resolve(&deployment_name(instance_id), metadata, context_id, &report)
                .await;
        }

        let task = match self.director.get_task(metadata.task_id).await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                warn!(
                    request_id = %report.request_id,
                    instance_id = %instance_id,
                    task_id = %metadata.task_id,
                    "Director does not know the task"
                );
                return Ok(report.failed(None));
            }
            Err(e) => return Err(BrokerError::DirectorUnavailable(e)),
        };

        info!(
            request_id = %report.request_id,
            instance_id = %instance_id,
            task_id = %task.id,
            state = %task.state,
            operation = %metadata.operation_type,
            "Resolved director task"
        );

        Ok(match &task.state {
            state if state.is_in_progress() => report.in_progress(),
            TaskState::Done => report.succeeded(),
            _ => report.failed_task(&task),
        })
    }
}

/// Builds the descriptions for one resolve call.
pub(crate) struct Report {
    service: String,
    instance_id: InstanceId,
    operation: OperationType,
    request_id: RequestId,
}

impl Report {
    pub(crate) fn new(
        catalog: &ServiceCatalog,
        instance_id: &InstanceId,
        operation: OperationType,
    ) -> Self {
        Self {
            service: catalog.name.clone(),
            instance_id: instance_id.clone(),
            operation,
            request_id: RequestId::generate(),
        }
    }

    pub(crate) fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub(crate) fn operation(&self) -> OperationType {
        self.operation
    }

    pub(crate) fn in_progress(&self) -> LastOperation {
        LastOperation::in_progress(format!(
            "Instance {} in progress",
            self.operation.progress_noun()
        ))
    }

    pub(crate) fn running_errand(&self, errand: &str) -> LastOperation {
        LastOperation::in_progress(format!(
            "Instance {} in progress: running errand {}",
            self.operation.progress_noun(),
            errand
        ))
    }

    pub(crate) fn succeeded(&self) -> LastOperation {
        LastOperation::succeeded(format!(
            "Instance {} completed",
            self.operation.progress_noun()
        ))
    }

    pub(crate) fn failure(&self) -> FailureDescription {
        FailureDescription::new(self.service.clone(), &self.instance_id, &self.request_id)
            .with_operation(self.operation)
    }

    pub(crate) fn failed(&self, task_id: Option<TaskId>) -> LastOperation {
        let mut failure = self.failure();
        if let Some(task_id) = task_id {
            failure = failure.with_task(task_id);
        }
        LastOperation::failed(failure.to_string())
    }

    /// Failed result for a task that ended badly.
    ///
    /// Unknown states are logged verbatim and reported without a task id.
    pub(crate) fn failed_task(&self, task: &RemoteTask) -> LastOperation {
        match &task.state {
            TaskState::Unrecognized(raw) => {
                warn!(
                    request_id = %self.request_id,
                    instance_id = %self.instance_id,
                    task_id = %task.id,
                    state = %raw,
                    "Unrecognized director task state"
                );
                self.failed(None)
            }
            state => {
                warn!(
                    request_id = %self.request_id,
                    instance_id = %self.instance_id,
                    task_id = %task.id,
                    state = %state,
                    description = %task.description,
                    operation = %self.operation,
                    "Director task failed"
                );
                self.failed(Some(task.id))
            }
        }
    }
}
