//! Director client: tasks, errands and deployments.
//!
//! The director owns every deployment backing a service instance. All of its
//! mutating endpoints answer with a redirect to the task they started, so the
//! client follows the redirect and reads the task id from the task document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use fleetbroker_core::{ContextId, RemoteTask, TaskId, TaskOutput, TaskState};

use crate::error::ClientError;
use crate::http::{ensure_success, parse_json, Auth, HttpClient};

/// Header carrying the correlation id for chained tasks.
pub const CONTEXT_ID_HEADER: &str = "X-Bosh-Context-Id";

/// Operations the broker needs from the director.
#[async_trait]
pub trait Director: Send + Sync {
    /// Fetch one task.
    async fn get_task(&self, task_id: TaskId) -> Result<RemoteTask, ClientError>;

    /// Fetch every task started under `context_id` for a deployment,
    /// most recent first.
    async fn list_tasks_by_context(
        &self,
        deployment: &str,
        context_id: &ContextId,
    ) -> Result<Vec<RemoteTask>, ClientError>;

    /// Fetch tasks that have not finished for a deployment.
    async fn list_incomplete_tasks(&self, deployment: &str)
        -> Result<Vec<RemoteTask>, ClientError>;

    /// Fetch the result of a finished errand task.
    async fn get_task_output(&self, task_id: TaskId) -> Result<TaskOutput, ClientError>;

    /// Start an errand.
    async fn run_errand(
        &self,
        deployment: &str,
        errand: &str,
        context_id: &ContextId,
    ) -> Result<TaskId, ClientError>;

    /// Deploy a manifest (creating or updating the deployment it names).
    async fn deploy(
        &self,
        manifest: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError>;

    /// Delete a deployment.
    async fn delete_deployment(
        &self,
        deployment: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError>;

    /// Fetch a deployment's manifest, `None` if the deployment does not exist.
    async fn get_deployment(&self, deployment: &str) -> Result<Option<String>, ClientError>;
}

/// Task document as served by the director.
#[derive(Debug, Deserialize)]
struct DirectorTask {
    id: u64,
    state: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    context_id: Option<String>,
}

impl From<DirectorTask> for RemoteTask {
    fn from(task: DirectorTask) -> Self {
        let mut remote = RemoteTask::new(TaskId::new(task.id), TaskState::from(task.state))
            .with_description(task.description);
        remote.context_id = task
            .context_id
            .filter(|c| !c.is_empty())
            .map(ContextId::new);
        remote
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentDocument {
    #[serde(default)]
    manifest: String,
}

/// HTTP client for the director API.
#[derive(Debug, Clone)]
pub struct DirectorClient {
    http: HttpClient,
}

impl DirectorClient {
    /// Create a new director client using basic auth.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let auth = Auth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        };
        Ok(Self {
            http: HttpClient::new(base_url, auth, timeout)?,
        })
    }

    async fn list_tasks(&self, query: &[(&str, &str)]) -> Result<Vec<RemoteTask>, ClientError> {
        let response = self
            .http
            .request(Method::GET, "/tasks")
            .query(query)
            .send()
            .await?;
        let tasks: Vec<DirectorTask> = parse_json(ensure_success(response).await?).await?;
        Ok(tasks.into_iter().map(RemoteTask::from).collect())
    }

    async fn started_task(&self, response: reqwest::Response) -> Result<TaskId, ClientError> {
        let task: DirectorTask = parse_json(ensure_success(response).await?).await?;
        Ok(TaskId::new(task.id))
    }
}

#[async_trait]
impl Director for DirectorClient {
    async fn get_task(&self, task_id: TaskId) -> Result<RemoteTask, ClientError> {
        let task: Option<DirectorTask> = self
            .http
            .get_optional_json(&format!("/tasks/{}", task_id))
            .await?;
        task.map(RemoteTask::from)
            .ok_or_else(|| ClientError::NotFound(format!("task {}", task_id)))
    }

    async fn list_tasks_by_context(
        &self,
        deployment: &str,
        context_id: &ContextId,
    ) -> Result<Vec<RemoteTask>, ClientError> {
        self.list_tasks(&[
            ("deployment", deployment),
            ("context_id", context_id.as_str()),
            ("verbose", "1"),
        ])
        .await
    }

    async fn list_incomplete_tasks(
        &self,
        deployment: &str,
    ) -> Result<Vec<RemoteTask>, ClientError> {
        self.list_tasks(&[
            ("deployment", deployment),
            ("state", "queued,processing,cancelling"),
            ("verbose", "1"),
        ])
        .await
    }

    async fn get_task_output(&self, task_id: TaskId) -> Result<TaskOutput, ClientError> {
        let response = self
            .http
            .request(Method::GET, &format!("/tasks/{}/output", task_id))
            .query(&[("type", "result")])
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        parse_task_output(&body)
    }

    async fn run_errand(
        &self,
        deployment: &str,
        errand: &str,
        context_id: &ContextId,
    ) -> Result<TaskId, ClientError> {
        let response = self
            .http
            .request(
                Method::POST,
                &format!("/deployments/{}/errands/{}/runs", deployment, errand),
            )
            .header(CONTEXT_ID_HEADER, context_id.as_str())
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let task_id = self.started_task(response).await?;

        info!(
            deployment = %deployment,
            errand = %errand,
            context_id = %context_id,
            task_id = %task_id,
            "Errand started"
        );
        Ok(task_id)
    }

    async fn deploy(
        &self,
        manifest: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError> {
        let mut request = self
            .http
            .request(Method::POST, "/deployments")
            .header(CONTENT_TYPE, "text/yaml")
            .body(manifest.to_string());
        if let Some(context_id) = context_id {
            request = request.header(CONTEXT_ID_HEADER, context_id.as_str());
        }

        let task_id = self.started_task(request.send().await?).await?;
        debug!(task_id = %task_id, "Deploy task started");
        Ok(task_id)
    }

    async fn delete_deployment(
        &self,
        deployment: &str,
        context_id: Option<&ContextId>,
    ) -> Result<TaskId, ClientError> {
        let mut request = self
            .http
            .request(Method::DELETE, &format!("/deployments/{}", deployment));
        if let Some(context_id) = context_id {
            request = request.header(CONTEXT_ID_HEADER, context_id.as_str());
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("deployment {}", deployment)));
        }
        self.started_task(response).await
    }

    async fn get_deployment(&self, deployment: &str) -> Result<Option<String>, ClientError> {
        let document: Option<DeploymentDocument> = self
            .http
            .get_optional_json(&format!("/deployments/{}", deployment))
            .await?;
        Ok(document.map(|d| d.manifest))
    }
}

/// Parse errand results.
///
/// The director emits one JSON document per line, one per errand instance.
/// The first failing instance wins; otherwise the last result is returned.
pub fn parse_task_output(body: &str) -> Result<TaskOutput, ClientError> {
    let mut last = None;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let output: TaskOutput =
            serde_json::from_str(line).map_err(|e| ClientError::Serialization(e.to_string()))?;
        if output.exit_code != 0 {
            return Ok(output);
        }
        last = Some(output);
    }

    last.ok_or_else(|| ClientError::Serialization("empty task output".to_string()))
}
