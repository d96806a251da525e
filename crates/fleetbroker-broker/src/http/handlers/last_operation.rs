//! Last-operation polling handler.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use fleetbroker_core::{CoreError, InstanceId, RequestId};

use crate::error::BrokerError;
use crate::failure::FailureDescription;
use crate::http::responses::{error_response, ErrorResponse, LastOperationQuery};
use crate::service::InstanceService;
use crate::state::AppState;

/// GET /v2/service_instances/:instance_id/last_operation
///
/// A poll without operation data cannot be resolved and is answered with the
/// generic failure description. Undecodable operation data is a client error.
pub async fn last_operation(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<LastOperationQuery>,
) -> Response {
    let instance_id = InstanceId::new(instance_id);
    let operation_data = query.operation.unwrap_or_default();

    let result = InstanceService::new(state.clone())
        .last_operation(&instance_id, &operation_data)
        .await;

    match result {
        Ok(last_operation) => (StatusCode::OK, Json(last_operation)).into_response(),
        Err(BrokerError::OperationData(CoreError::MissingOperationData)) => {
            let failure = FailureDescription::new(
                state.config.service_catalog.name.clone(),
                &instance_id,
                &RequestId::generate(),
            );
            warn!(
                request_id = %failure.request_id(),
                instance_id = %instance_id,
                "Last-operation poll without operation data"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(failure.to_string())),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}
