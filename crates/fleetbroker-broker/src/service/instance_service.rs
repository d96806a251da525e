//! Instance lifecycle operations.
//!
//! Every operation follows the same shape: check the request against the
//! registry and the director, render a manifest if one is needed, start the
//! director work and hand back the metadata the marketplace will poll with.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use fleetbroker_clients::{ClientError, GenerateManifestRequest};
use fleetbroker_core::{
    deployment_name, ContextId, InstanceId, LastOperation, OperationMetadata, OperationType,
    RequestId, TaskId,
};

use crate::config::Plan;
use crate::error::BrokerError;
use crate::failure::FailureDescription;
use crate::quota::QuotaGate;
use crate::resolver::LastOperationResolver;
use crate::state::AppState;

/// Provision, update, upgrade and deprovision service instances.
pub struct InstanceService {
    state: Arc<AppState>,
}

impl InstanceService {
    /// Create a new InstanceService.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Create a deployment for a new instance.
    pub async fn provision(
        &self,
        instance_id: &InstanceId,
        plan_id: &str,
        parameters: Value,
    ) -> Result<OperationMetadata, BrokerError> {
        let plan = self.plan(plan_id)?;
        let deployment = deployment_name(instance_id);

        if self.current_manifest(&deployment).await?.is_some() {
            return Err(BrokerError::InstanceAlreadyExists);
        }

        self.check_quota(plan, true).await?;
        self.ensure_no_incomplete_tasks(&deployment).await?;

        let manifest = self
            .generate_manifest(
                instance_id,
                OperationType::Create,
                GenerateManifestRequest {
                    deployment_name: deployment.clone(),
                    plan: plan.to_adapter_json(),
                    request_params: parameters,
                    previous_manifest: None,
                    previous_plan: None,
                },
            )
            .await?;

        self.deploy(instance_id, OperationType::Create, plan, &manifest)
            .await
    }

    /// Redeploy an instance with new parameters, possibly on a new plan.
    ///
    /// The plan quota only applies when the plan changes. The instance is
    /// already counted against the offering, so the service-wide limit is
    /// not checked.
    pub async fn update(
        &self,
        instance_id: &InstanceId,
        plan_id: &str,
        parameters: Value,
        previous_plan_id: Option<&str>,
    ) -> Result<OperationMetadata, BrokerError> {
        let plan = self.plan(plan_id)?;
        let deployment = deployment_name(instance_id);

        let previous_manifest = self
            .current_manifest(&deployment)
            .await?
            .ok_or(BrokerError::DeploymentNotFound)?;

        let previous_plan = previous_plan_id.and_then(|id| self.state.config.service_catalog.plan(id));
        if previous_plan_id.is_some_and(|id| id != plan.id) {
            self.check_quota(plan, false).await?;
        }

        self.ensure_no_incomplete_tasks(&deployment).await?;

        let manifest = self
            .generate_manifest(
                instance_id,
                OperationType::Update,
                GenerateManifestRequest {
                    deployment_name: deployment.clone(),
                    plan: plan.to_adapter_json(),
                    request_params: parameters,
                    previous_manifest: Some(previous_manifest),
                    previous_plan: previous_plan.map(Plan::to_adapter_json),
                },
            )
            .await?;

        self.deploy(instance_id, OperationType::Update, plan, &manifest)
            .await
    }

    /// Redeploy an instance on its current plan with a freshly rendered
    /// manifest.
    pub async fn upgrade(&self, instance_id: &InstanceId) -> Result<OperationMetadata, BrokerError> {
        let record = self
            .state
            .registry
            .get_instance(instance_id)
            .await
            .map_err(BrokerError::RegistryUnavailable)?
            .ok_or(BrokerError::InstanceNotFound)?;

        if record.operation_in_progress() {
            info!(instance_id = %instance_id, "Registry reports an operation in progress");
            return Err(BrokerError::OperationInProgress);
        }

        let plan = self.plan(&record.plan_id)?;
        let deployment = deployment_name(instance_id);

        let previous_manifest = self
            .current_manifest(&deployment)
            .await?
            .ok_or(BrokerError::DeploymentNotFound)?;

        self.ensure_no_incomplete_tasks(&deployment).await?;

        let manifest = self
            .generate_manifest(
                instance_id,
                OperationType::Upgrade,
                GenerateManifestRequest {
                    deployment_name: deployment.clone(),
                    plan: plan.to_adapter_json(),
                    request_params: Value::Object(Default::default()),
                    previous_manifest: Some(previous_manifest),
                    previous_plan: Some(plan.to_adapter_json()),
                },
            )
            .await?;

        self.deploy(instance_id, OperationType::Upgrade, plan, &manifest)
            .await
    }

    /// Delete an instance's deployment, running the pre-delete errand first
    /// when the plan has one.
    pub async fn deprovision(
        &self,
        instance_id: &InstanceId,
        plan_id: Option<&str>,
    ) -> Result<OperationMetadata, BrokerError> {
        let deployment = deployment_name(instance_id);

        if self.current_manifest(&deployment).await?.is_none() {
            return Err(BrokerError::DeploymentNotFound);
        }

        self.ensure_no_incomplete_tasks(&deployment).await?;

        let plan = plan_id.and_then(|id| self.state.config.service_catalog.plan(id));
        let plan_id = plan_id.unwrap_or_default();
        let director = &self.state.director;

        let metadata = match plan.and_then(|p| p.lifecycle_errands.pre_delete.as_deref()) {
            Some(errand) => {
                let context_id = ContextId::generate();
                let task_id = director
                    .run_errand(&deployment, errand, &context_id)
                    .await
                    .map_err(BrokerError::DirectorUnavailable)?;
                info!(
                    instance_id = %instance_id,
                    task_id = %task_id,
                    context_id = %context_id,
                    errand = %errand,
                    "Started pre-delete errand"
                );
                OperationMetadata::new(OperationType::Delete, task_id, plan_id)
                    .with_errand(context_id, errand)
            }
            None => {
                let task_id = director
                    .delete_deployment(&deployment, None)
                    .await
                    .map_err(|e| match e {
                        e if e.is_not_found() => BrokerError::DeploymentNotFound,
                        e => BrokerError::DirectorUnavailable(e),
                    })?;
                info!(instance_id = %instance_id, task_id = %task_id, "Deleting deployment");
                OperationMetadata::new(OperationType::Delete, task_id, plan_id)
            }
        };

        self.state.metrics.record_accepted(OperationType::Delete);
        Ok(metadata)
    }

    /// Resolve a last-operation poll from its raw operation data.
    pub async fn last_operation(
        &self,
        instance_id: &InstanceId,
        operation_data: &str,
    ) -> Result<LastOperation, BrokerError> {
        let metadata = OperationMetadata::decode(operation_data)?;

        let result = LastOperationResolver::new(
            self.state.director.as_ref(),
            &self.state.config.service_catalog,
        )
        .resolve(instance_id, &metadata)
        .await?;

        self.state.metrics.record_result(result.state);
        Ok(result)
    }

    fn plan(&self, plan_id: &str) -> Result<&Plan, BrokerError> {
        self.state
            .config
            .service_catalog
            .plan(plan_id)
            .ok_or_else(|| BrokerError::UnknownPlan(plan_id.to_string()))
    }

    async fn current_manifest(&self, deployment: &str) -> Result<Option<String>, BrokerError> {
        self.state
            .director
            .get_deployment(deployment)
            .await
            .map_err(BrokerError::DirectorUnavailable)
    }

    async fn check_quota(&self, plan: &Plan, new_instance: bool) -> Result<(), BrokerError> {
        let gate = QuotaGate::new(
            self.state.registry.as_ref(),
            &self.state.config.service_catalog,
        );
        let decision = if new_instance {
            gate.check(plan).await?
        } else {
            gate.check_plan(plan).await?
        };

        if !decision.is_allowed() {
            self.state.metrics.record_quota_rejection();
        }
        decision.into_result()
    }

    /// Refuse to start work while the director is busy with the deployment.
    async fn ensure_no_incomplete_tasks(&self, deployment: &str) -> Result<(), BrokerError> {
        let tasks = self
            .state
            .director
            .list_incomplete_tasks(deployment)
            .await
            .map_err(BrokerError::DirectorUnavailable)?;

        if let Some(task) = tasks.first() {
            info!(
                deployment = %deployment,
                task_id = %task.id,
                state = %task.state,
                "Deployment has incomplete tasks"
            );
            return Err(BrokerError::OperationInProgress);
        }
        Ok(())
    }

    /// Run the adapter and check that its output is a manifest for this
    /// deployment.
    async fn generate_manifest(
        &self,
        instance_id: &InstanceId,
        operation: OperationType,
        request: GenerateManifestRequest,
    ) -> Result<String, BrokerError> {
        let failure = || {
            FailureDescription::new(
                self.state.config.service_catalog.name.clone(),
                instance_id,
                &RequestId::generate(),
            )
            .with_operation(operation)
        };

        let generated = match self.state.adapter.generate_manifest(&request).await {
            Ok(generated) => generated,
            Err(source) => {
                let failure = failure();
                log_adapter_error(failure.request_id(), instance_id, &source);
                return Err(BrokerError::AdapterInvocation { failure, source });
            }
        };

        if let Err(reason) = validate_manifest(&generated.manifest, &request.deployment_name) {
            let failure = failure();
            error!(
                request_id = %failure.request_id(),
                instance_id = %instance_id,
                reason = %reason,
                "Adapter produced an invalid manifest"
            );
            return Err(BrokerError::InvalidManifest { failure, reason });
        }

        Ok(generated.manifest)
    }

    async fn deploy(
        &self,
        instance_id: &InstanceId,
        operation: OperationType,
        plan: &Plan,
        manifest: &str,
    ) -> Result<OperationMetadata, BrokerError> {
        let errand = plan.lifecycle_errands.post_deploy.as_deref();
        let context_id = errand.map(|_| ContextId::generate());

        let task_id: TaskId = self
            .state
            .director
            .deploy(manifest, context_id.as_ref())
            .await
            .map_err(BrokerError::DirectorUnavailable)?;

        info!(
            instance_id = %instance_id,
            task_id = %task_id,
            plan_id = %plan.id,
            operation = %operation,
            "Deployment started"
        );

        let metadata = OperationMetadata::new(operation, task_id, plan.id.clone());
        let metadata = match (context_id, errand) {
            (Some(context_id), Some(errand)) => metadata.with_errand(context_id, errand),
            _ => metadata,
        };

        self.state.metrics.record_accepted(operation);
        Ok(metadata)
    }
}

fn log_adapter_error(request_id: &RequestId, instance_id: &InstanceId, source: &ClientError) {
    match source {
        ClientError::Adapter {
            exit_code,
            operator_message,
        } => error!(
            request_id = %request_id,
            instance_id = %instance_id,
            exit_code = exit_code,
            operator_message = %operator_message,
            "Adapter failed to generate manifest"
        ),
        other => warn!(
            request_id = %request_id,
            instance_id = %instance_id,
            error = %other,
            "Adapter could not be invoked"
        ),
    }
}

/// A manifest must be a YAML mapping whose `name` is the deployment name.
fn validate_manifest(manifest: &str, deployment: &str) -> Result<(), String> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(manifest).map_err(|e| format!("not valid YAML: {}", e))?;

    let name = document
        .as_mapping()
        .ok_or_else(|| "manifest is not a mapping".to_string())?
        .get("name")
        .and_then(serde_yaml::Value::as_str)
        .ok_or_else(|| "manifest has no name".to_string())?;

    if name != deployment {
        return Err(format!(
            "manifest name '{}' does not match deployment '{}'",
            name, deployment
        ));
    }
    Ok(())
}
