//! Operator management handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use fleetbroker_core::InstanceId;

use crate::http::handlers::instances::accepted;
use crate::http::responses::{error_response, ErrorResponse, ManagementQuery};
use crate::service::InstanceService;
use crate::state::AppState;

/// PATCH /mgmt/service_instances/:instance_id?operation_type=upgrade
pub async fn manage_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<ManagementQuery>,
) -> Response {
    match query.operation_type.as_deref() {
        Some("upgrade") => {}
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!(
                    "Unsupported operation type: {}",
                    other.unwrap_or("none")
                ))),
            )
                .into_response()
        }
    }

    let instance_id = InstanceId::new(instance_id);
    match InstanceService::new(state).upgrade(&instance_id).await {
        Ok(metadata) => accepted(&metadata),
        Err(err) => error_response(&err),
    }
}
