//! Client for the broker's own management and last-operation endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use fleetbroker_core::{InstanceId, LastOperation};

use crate::error::ClientError;
use crate::http::{ensure_success, parse_json, Auth, HttpClient};

/// How the broker answered an upgrade trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResponse {
    /// Upgrade started; poll with this operation data.
    Accepted { operation_data: String },
    /// The registry no longer knows the instance.
    InstanceNotFound,
    /// The instance exists but its deployment does not.
    OrphanDeployment,
    /// Something else is running against the deployment.
    OperationInProgress,
}

/// The broker endpoints driven by the fleet upgrader.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Start an upgrade of one instance.
    async fn upgrade_instance(&self, instance_id: &InstanceId)
        -> Result<TriggerResponse, ClientError>;

    /// Poll the last operation of an instance.
    async fn last_operation(
        &self,
        instance_id: &InstanceId,
        operation_data: &str,
    ) -> Result<LastOperation, ClientError>;
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(default)]
    operation: String,
}

/// HTTP client for a running broker.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: HttpClient,
}

impl BrokerClient {
    /// Create a new broker client using basic auth.
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
}

#[async_trait]
impl BrokerApi for BrokerClient {
    async fn upgrade_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<TriggerResponse, ClientError> {
        let response = self
            .http
            .request(
                Method::PATCH,
                &format!("/mgmt/service_instances/{}", instance_id),
            )
            .query(&[("operation_type", "upgrade")])
            .send()
            .await?;

        debug!(instance_id = %instance_id, status = %response.status(), "Upgrade trigger answered");
        match response.status() {
            StatusCode::NOT_FOUND => Ok(TriggerResponse::InstanceNotFound),
            StatusCode::GONE => Ok(TriggerResponse::OrphanDeployment),
            StatusCode::CONFLICT => Ok(TriggerResponse::OperationInProgress),
            _ => {
                let body: OperationResponse = parse_json(ensure_success(response).await?).await?;
                Ok(TriggerResponse::Accepted {
                    operation_data: body.operation,
                })
            }
        }
    }

    async fn last_operation(
        &self,
        instance_id: &InstanceId,
        operation_data: &str,
    ) -> Result<LastOperation, ClientError> {
        let response = self
            .http
            .request(
                Method::GET,
                &format!("/v2/service_instances/{}/last_operation", instance_id),
            )
            .query(&[("operation", operation_data)])
            .send()
            .await?;
        parse_json(ensure_success(response).await?).await
    }
}
