//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use fleetbroker_clients::{
    ClientError, Director, GenerateManifestRequest, GeneratedManifest, ManifestGenerator, Registry,
};
use fleetbroker_core::{
    ContextId, InstanceFilter, InstanceId, InstanceRecord, InstanceState, RegistryLastOperation,
    RemoteTask, ServiceInstance, TaskId, TaskOutput,
};

use crate::config::{Config, Plan, Quotas, ServiceCatalog};

/// Catalog used across broker tests.
///
/// - `small`: at most 5 instances
/// - `large`: unlimited
/// - `errand-plan`: post-deploy `health-check`, pre-delete `cleanup`
/// - `zero`: no instances allowed
pub fn test_config() -> Config {
    Config {
        service_catalog: ServiceCatalog {
            id: "redis-offering".to_string(),
            name: "redis".to_string(),
            global_quotas: Quotas::default(),
            plans: vec![
                Plan::new("small").with_limit(5),
                Plan::new("large"),
                Plan::new("errand-plan")
                    .with_post_deploy("health-check")
                    .with_pre_delete("cleanup"),
                Plan::new("zero").with_limit(0),
            ],
        },
        ..Config::default()
    }
}

fn unavailable() -> ClientError {
    ClientError::Connection("director is down".to_string())
}

/// A call made against [`FakeDirector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorCall {
    GetTask(TaskId),
    ListTasksByContext(String, ContextId),
    ListIncompleteTasks(String),
    GetTaskOutput(TaskId),
    RunErrand(String, String, ContextId),
    Deploy(String, Option<ContextId>),
    DeleteDeployment(String, Option<ContextId>),
    GetDeployment(String),
}

impl DirectorCall {
    /// Returns true for calls that start director work.
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            Self::RunErrand(..) | Self::Deploy(..) | Self::DeleteDeployment(..)
        )
    }
}

/// Director with canned tasks that records every call.
pub struct FakeDirector {
    tasks: HashMap<TaskId, RemoteTask>,
    context_tasks: HashMap<String, Vec<RemoteTask>>,
    incomplete: HashMap<String, Vec<RemoteTask>>,
    outputs: HashMap<TaskId, TaskOutput>,
    deployments: HashMap<String, String>,
    deleted_elsewhere: bool,
    down: bool,
    next_task: AtomicU64,
    calls: Mutex<Vec<DirectorCall>>,
}

impl Default for FakeDirector {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            context_tasks: HashMap::new(),
            incomplete: HashMap::new(),
            outputs: HashMap::new(),
            deployments: HashMap::new(),
            deleted_elsewhere: false,
            down: false,
            next_task: AtomicU64::new(100),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDirector {
    pub fn with_task(mut self, task: RemoteTask) -> Self {
        self.tasks.insert(task.id, task);
        self
    }

    /// Tasks listed for any context id on `deployment`, most recent first.
    pub fn with_context_tasks(mut self, deployment: &str, tasks: Vec<RemoteTask>) -> Self {
        self.context_tasks.insert(deployment.to_string(), tasks);
        self
    }

    pub fn with_incomplete(mut self, deployment: &str, tasks: Vec<RemoteTask>) -> Self {
        self.incomplete.insert(deployment.to_string(), tasks);
        self
    }

    pub fn with_output(mut self, task_id: TaskId, output: TaskOutput) -> Self {
        self.outputs.insert(task_id, output);
        self
    }

    pub fn with_deployment(mut self, deployment: &str, manifest: &str) -> Self {
        self.deployments
            .insert(deployment.to_string(), manifest.to_string());
        self
    }

    /// Deleting a deployment answers 404, as if it was already deleted.
    pub fn deleted_elsewhere(mut self) -> Self {
        self.deleted_elsewhere = true;
        self
    }

    /// Every call fails with a connection error.
    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    pub fn calls(&self) -> Vec<DirectorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_task_calls(&self) -> Vec<TaskId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DirectorCall::GetTask(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn triggers(&self) -> Vec<DirectorCall> {
        self.calls().into_iter().filter(|c| c.is_trigger()).collect()
    }

    fn record(&self, call: DirectorCall) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call);
        if self.down {
            return Err(unavailable());
        }
        Ok(())
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::new(self.next_task.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Director for FakeDirector {
    async fn get_task(&self, task_id: TaskId) -> Result<RemoteTask, ClientError> {
        self.record(DirectorCall::GetTask(task_id))?;
        self.tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("task {}", task_id)))
    }

    async fn list_tasks_by_context(
        &self,
        deployment: &str,
        context_id: &ContextId,
    ) -> Result<Vec<RemoteTask>, ClientError> {
        self.record(DirectorCall::ListTasksByContext(
            deployment.to_string(),
            context_id.clone(),
        ))?;
        Ok(self.context_tasks.get(deployment).cloned().unwrap_or_default())
    }

    async fn list_incomplete_tasks(
        &self,
        deployment: &str,
    ) -> Result<Vec<RemoteTask>, ClientError> {
        self.record(DirectorCall::ListIncompleteTasks(deployment.to_string()))?;
        Ok(self.incomplete.get(deployment).cloned().unwrap_or_default())
    }

    async fn get_task_output(&self, task_id: TaskId) -> Result<TaskOutput, ClientError> {
        self.record(DirectorCall::GetTaskOutput(task_id))?;
        self.outputs
            .get(&task_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("output of task {}", task_id)))
    }

    async fn run_errand(
        &self,
        deployment: &str,
        errand: &str,
        context_id: &ContextId,
    ) -> Result<TaskId, ClientError> {
        self.record(DirectorCall::RunErrand(
            deployment.to_string(),
            errand.to_string(),
            context_id.clone(),
        ))?;
        Ok(self.next_task_id())
    }

    async fn deploy(
        &self,
        manifest: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError> {
        self.record(DirectorCall::Deploy(
            manifest.to_string(),
            context_id.cloned(),
        ))?;
        Ok(self.next_task_id())
    }

    async fn delete_deployment(
        &self,
        deployment: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError> {
        self.record(DirectorCall::DeleteDeployment(
            deployment.to_string(),
            context_id.cloned(),
        ))?;
        if self.deleted_elsewhere {
            return Err(ClientError::NotFound(format!("deployment {}", deployment)));
        }
        Ok(self.next_task_id())
    }

    async fn get_deployment(&self, deployment: &str) -> Result<Option<String>, ClientError> {
        self.record(DirectorCall::GetDeployment(deployment.to_string()))?;
        Ok(self.deployments.get(deployment).cloned())
    }
}

/// Registry backed by maps.
#[derive(Default)]
pub struct FakeRegistry {
    plan_counts: HashMap<String, usize>,
    instances: HashMap<InstanceId, InstanceRecord>,
    down: bool,
}

impl FakeRegistry {
    pub fn with_plan_count(mut self, plan_id: &str, count: usize) -> Self {
        self.plan_counts.insert(plan_id.to_string(), count);
        self
    }

    pub fn with_instance(mut self, guid: &str, plan_id: &str, in_progress: bool) -> Self {
        let last_operation = RegistryLastOperation {
            operation_type: "update".to_string(),
            state: if in_progress { "in progress" } else { "succeeded" }.to_string(),
        };
        self.instances.insert(
            InstanceId::new(guid),
            InstanceRecord {
                plan_id: plan_id.to_string(),
                last_operation: Some(last_operation),
            },
        );
        self
    }

    pub fn down(mut self) -> Self {
        self.down = true;
        self
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.down {
            return Err(ClientError::Connection("registry is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list_instances(
        &self,
        _offering_id: &str,
        _filter: &InstanceFilter,
    ) -> Result<Vec<ServiceInstance>, ClientError> {
        self.check()?;
        Ok(self
            .instances
            .iter()
            .map(|(guid, record)| ServiceInstance {
                guid: guid.clone(),
                plan_id: record.plan_id.clone(),
            })
            .collect())
    }

    async fn get_instance_state(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceState>, ClientError> {
        self.check()?;
        Ok(self.instances.get(instance_id).map(|record| InstanceState {
            plan_id: record.plan_id.clone(),
            operation_in_progress: record.operation_in_progress(),
        }))
    }

    async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<InstanceRecord>, ClientError> {
        self.check()?;
        Ok(self.instances.get(instance_id).cloned())
    }

    async fn count_instances_of_plan(
        &self,
        _offering_id: &str,
        plan_id: &str,
    ) -> Result<usize, ClientError> {
        self.check()?;
        Ok(self.plan_counts.get(plan_id).copied().unwrap_or(0))
    }

    async fn count_instances_of_offering(&self, _offering_id: &str) -> Result<usize, ClientError> {
        self.check()?;
        Ok(self.plan_counts.values().sum())
    }
}

/// Adapter returning a fixed manifest, or a fixed failure.
#[derive(Default)]
pub struct FakeAdapter {
    manifest: Option<String>,
    failure: Option<(i32, String)>,
    requests: Mutex<Vec<GenerateManifestRequest>>,
}

impl FakeAdapter {
    /// Return `manifest` verbatim instead of a minimal valid one.
    pub fn with_manifest(mut self, manifest: &str) -> Self {
        self.manifest = Some(manifest.to_string());
        self
    }

    pub fn failing(mut self, exit_code: i32, operator_message: &str) -> Self {
        self.failure = Some((exit_code, operator_message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<GenerateManifestRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManifestGenerator for FakeAdapter {
    async fn generate_manifest(
        &self,
        request: &GenerateManifestRequest,
    ) -> Result<GeneratedManifest, ClientError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some((exit_code, message)) = &self.failure {
            return Err(ClientError::Adapter {
                exit_code: *exit_code,
                operator_message: message.clone(),
            });
        }

        let manifest = self.manifest.clone().unwrap_or_else(|| {
            format!(
                "name: {}\ninstance_groups:\n- name: redis\n  instances: 1\n",
                request.deployment_name
            )
        });
        Ok(GeneratedManifest { manifest })
    }
}
