//! Provision, update and deprovision handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use fleetbroker_core::{InstanceId, OperationMetadata};

use crate::error::BrokerError;
use crate::http::responses::{
    error_response, DeprovisionQuery, OperationResponse, ProvisionRequest, UpdateRequest,
};
use crate::service::InstanceService;
use crate::state::AppState;

/// 202 with the operation data for an accepted operation.
pub(crate) fn accepted(metadata: &OperationMetadata) -> Response {
    match metadata.encode() {
        Ok(operation) => (StatusCode::ACCEPTED, Json(OperationResponse { operation })).into_response(),
        Err(e) => error_response(&BrokerError::from(e)),
    }
}

fn parameters(value: Value) -> Value {
    if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    }
}

/// PUT /v2/service_instances/:instance_id
pub async fn provision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Json(request): Json<ProvisionRequest>,
) -> Response {
    let instance_id = InstanceId::new(instance_id);
    let result = InstanceService::new(state)
        .provision(&instance_id, &request.plan_id, parameters(request.parameters))
        .await;

    match result {
        Ok(metadata) => accepted(&metadata),
        Err(err) => error_response(&err),
    }
}

/// PATCH /v2/service_instances/:instance_id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let instance_id = InstanceId::new(instance_id);
    let result = InstanceService::new(state)
        .update(
            &instance_id,
            &request.plan_id,
            parameters(request.parameters),
            request.previous_values.plan_id.as_deref(),
        )
        .await;

    match result {
        Ok(metadata) => accepted(&metadata),
        Err(err) => error_response(&err),
    }
}

/// DELETE /v2/service_instances/:instance_id
pub async fn deprovision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> Response {
    let instance_id = InstanceId::new(instance_id);
    let result = InstanceService::new(state)
        .deprovision(&instance_id, query.plan_id.as_deref())
        .await;

    match result {
        Ok(metadata) => accepted(&metadata),
        Err(err) => error_response(&err),
    }
}
