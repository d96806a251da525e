//! HTTP request and response types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use fleetbroker_core::CoreError;

use crate::error::BrokerError;

// ============================================================================
// Instance types
// ============================================================================

/// Request body for provisioning.
#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    /// Offering id; informational, the broker serves one offering.
    #[serde(default)]
    pub service_id: String,

    /// Plan to provision.
    pub plan_id: String,

    /// Arbitrary parameters passed through to the adapter.
    #[serde(default)]
    pub parameters: Value,
}

/// Values of the instance before an update.
#[derive(Debug, Default, Deserialize)]
pub struct PreviousValues {
    #[serde(default)]
    pub plan_id: Option<String>,
}

/// Request body for updates.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    /// Plan after the update.
    pub plan_id: String,

    #[serde(default)]
    pub parameters: Value,

    #[serde(default)]
    pub previous_values: PreviousValues,
}

/// Query string for deprovisioning.
#[derive(Debug, Default, Deserialize)]
pub struct DeprovisionQuery {
    #[serde(default)]
    pub plan_id: Option<String>,
}

/// Query string for last-operation polls.
#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    /// Operation data handed out when the operation was accepted.
    #[serde(default)]
    pub operation: Option<String>,
}

/// Query string for management operations.
#[derive(Debug, Default, Deserialize)]
pub struct ManagementQuery {
    #[serde(default)]
    pub operation_type: Option<String>,
}

/// Response for an accepted asynchronous operation.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Opaque operation data to poll with.
    pub operation: String,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub description: String,
}

impl ErrorResponse {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// HTTP status for a broker error.
pub fn status_for(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::OperationData(
            CoreError::MissingOperationData | CoreError::Serialization(_),
        ) => StatusCode::INTERNAL_SERVER_ERROR,
        BrokerError::OperationData(_) => StatusCode::BAD_REQUEST,
        BrokerError::UnknownPlan(_) => StatusCode::BAD_REQUEST,
        BrokerError::QuotaExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BrokerError::OperationInProgress | BrokerError::InstanceAlreadyExists => {
            StatusCode::CONFLICT
        }
        BrokerError::InstanceNotFound => StatusCode::NOT_FOUND,
        BrokerError::DeploymentNotFound => StatusCode::GONE,
        BrokerError::DirectorUnavailable(_)
        | BrokerError::RegistryUnavailable(_)
        | BrokerError::AdapterInvocation { .. }
        | BrokerError::InvalidManifest { .. }
        | BrokerError::ErrandNotConfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a broker error into a response with an operator-safe description.
pub fn error_response(err: &BrokerError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "Request failed");
    }
    (status, Json(ErrorResponse::new(err.user_description()))).into_response()
}
