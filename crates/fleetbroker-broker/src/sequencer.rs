//! Errand sequencing.
//!
//! An operation with a chained errand is a short chain of director tasks that
//! share one context id:
//!
//! - create, update and upgrade: `deploy` first, then the post-deploy errand
//! - delete: the pre-delete errand first, then the deployment deletion
//!
//! Nothing remembers which step the chain is at. Each poll lists the tasks
//! for the context id, works out the step from how many there are and what
//! state the most recent one is in, and triggers the next task when the
//! first one has finished. The director lists the most recent task first and
//! that order is used as-is.

use tracing::{error, info, warn};

use fleetbroker_clients::Director;
use fleetbroker_core::{
    ContextId, LastOperation, OperationMetadata, OperationType, RemoteTask, TaskState,
};

use crate::config::ServiceCatalog;
use crate::error::BrokerError;
use crate::resolver::Report;

/// Drives a task chain one step per poll.
pub(crate) struct ErrandSequencer<'a> {
    director: &'a dyn Director,
    catalog: &'a ServiceCatalog,
}

impl<'a> ErrandSequencer<'a> {
    /// Create a new sequencer.
    pub(crate) fn new(director: &'a dyn Director, catalog: &'a ServiceCatalog) -> Self {
        Self { director, catalog }
    }

    /// Resolve one poll of a chained operation.
    pub(crate) async fn resolve(
        &self,
        deployment: &str,
        metadata: &OperationMetadata,
        context_id: &ContextId,
        report: &Report,
    ) -> Result<LastOperation, BrokerError> {
        let tasks = self
            .director
            .list_tasks_by_context(deployment, context_id)
            .await
            .map_err(BrokerError::DirectorUnavailable)?;

        info!(
            request_id = %report.request_id(),
            deployment = %deployment,
            context_id = %context_id,
            task_count = tasks.len(),
            operation = %metadata.operation_type,
            "Listed tasks for context"
        );

        let Some(latest) = tasks.first() else {
            return Ok(report.in_progress());
        };

        if let Some(failed) = tasks.iter().find(|t| t.state.is_failure()) {
            return Ok(report.failed_task(failed));
        }

        let errand = self.errand_name(metadata);
        let is_delete = metadata.operation_type == OperationType::Delete;

        if latest.state.is_in_progress() {
            // Delete runs its errand first; everything else deploys first.
            let errand_running = (tasks.len() == 1) == is_delete;
            return Ok(match (errand_running, errand.as_deref()) {
                (true, Some(name)) => report.running_errand(name),
                _ => report.in_progress(),
            });
        }

        debug_assert_eq!(latest.state, TaskState::Done);

        match (tasks.len(), is_delete) {
            (1, false) => {
                let Some(name) = errand else {
                    return Err(self.errand_not_configured(metadata, report));
                };
                let task_id = self
                    .director
                    .run_errand(deployment, &name, context_id)
                    .await
                    .map_err(BrokerError::DirectorUnavailable)?;
                info!(
                    request_id = %report.request_id(),
                    deployment = %deployment,
                    errand = %name,
                    task_id = %task_id,
                    "Started post-deploy errand"
                );
                Ok(report.running_errand(&name))
            }
            (1, true) => {
                if let Some(failure) = self.check_exit_code(latest, report).await? {
                    return Ok(failure);
                }
                let task_id = match self
                    .director
                    .delete_deployment(deployment, Some(context_id))
                    .await
                {
                    Ok(task_id) => task_id,
                    Err(e) if e.is_not_found() => {
                        info!(
                            request_id = %report.request_id(),
                            deployment = %deployment,
                            "Deployment already deleted after pre-delete errand"
                        );
                        return Ok(report.succeeded());
                    }
                    Err(e) => return Err(BrokerError::DirectorUnavailable(e)),
                };
                info!(
                    request_id = %report.request_id(),
                    deployment = %deployment,
                    task_id = %task_id,
                    "Pre-delete errand succeeded, deleting deployment"
                );
                Ok(report.in_progress())
            }
            (_, false) => Ok(self
                .check_exit_code(latest, report)
                .await?
                .unwrap_or_else(|| report.succeeded())),
            (_, true) => Ok(report.succeeded()),
        }
    }

    /// Returns a Failed result if the errand task exited non-zero.
    async fn check_exit_code(
        &self,
        task: &RemoteTask,
        report: &Report,
    ) -> Result<Option<LastOperation>, BrokerError> {
        let output = self
            .director
            .get_task_output(task.id)
            .await
            .map_err(BrokerError::DirectorUnavailable)?;

        if output.exit_code == 0 {
            return Ok(None);
        }

        warn!(
            request_id = %report.request_id(),
            task_id = %task.id,
            exit_code = output.exit_code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "Errand exited with non-zero exit code"
        );
        Ok(Some(report.failed(Some(task.id))))
    }

    /// Errand recorded in the operation data, falling back to the plan.
    fn errand_name(&self, metadata: &OperationMetadata) -> Option<String> {
        if let Some(name) = &metadata.errand_name {
            return Some(name.clone());
        }

        let errands = &self.catalog.plan(&metadata.plan_id)?.lifecycle_errands;
        match metadata.operation_type {
            OperationType::Delete => errands.pre_delete.clone(),
            _ => errands.post_deploy.clone(),
        }
    }

    fn errand_not_configured(&self, metadata: &OperationMetadata, report: &Report) -> BrokerError {
        error!(
            request_id = %report.request_id(),
            plan_id = %metadata.plan_id,
            operation = %report.operation(),
            "Operation has a context id but no errand is configured"
        );
        BrokerError::ErrandNotConfigured {
            failure: report.failure(),
            plan_id: metadata.plan_id.clone(),
        }
    }
}
