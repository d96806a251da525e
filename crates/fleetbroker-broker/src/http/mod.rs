//! HTTP server for the broker.
//!
//! Provides endpoints for:
//! - Instance lifecycle (`/v2/service_instances/:instance_id`)
//! - Last-operation polling (`/v2/service_instances/:instance_id/last_operation`)
//! - Operator upgrades (`/mgmt/service_instances/:instance_id`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod auth;
mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route(
            "/v2/service_instances/:instance_id",
            put(handlers::provision)
                .patch(handlers::update)
                .delete(handlers::deprovision),
        )
        .route(
            "/v2/service_instances/:instance_id/last_operation",
            get(handlers::last_operation),
        )
        .route(
            "/mgmt/service_instances/:instance_id",
            patch(handlers::manage_instance),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::basic_auth,
        ));

    Router::new()
        .merge(authenticated)
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, FakeAdapter, FakeDirector, FakeRegistry};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use fleetbroker_core::{OperationMetadata, OperationType, RemoteTask, TaskId, TaskState};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const DEPLOYMENT: &str = "service-instance_inst-1";

    fn router(director: FakeDirector, registry: FakeRegistry) -> Router {
        let state = AppState::new(
            test_config(),
            Arc::new(director),
            Arc::new(registry),
            Arc::new(FakeAdapter::default()),
        );
        create_router(state)
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let auth = format!("Basic {}", STANDARD.encode("broker:broker"));
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(FakeDirector::default(), FakeRegistry::default()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/v2/service_instances/inst-1/last_operation?operation=x")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(router(FakeDirector::default(), FakeRegistry::default()), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_provision_accepted_and_polled() {
        let (status, body) = send(
            router(FakeDirector::default(), FakeRegistry::default()),
            request(
                Method::PUT,
                "/v2/service_instances/inst-1",
                Some(json!({"service_id": "redis-offering", "plan_id": "small"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let operation = body["operation"].as_str().unwrap().to_string();
        let metadata = OperationMetadata::decode(&operation).unwrap();
        assert_eq!(metadata.operation_type, OperationType::Create);

        let director = FakeDirector::default()
            .with_task(RemoteTask::new(metadata.task_id, TaskState::Processing));
        let uri = format!(
            "/v2/service_instances/inst-1/last_operation?operation={}",
            urlencode(&operation)
        );
        let (status, body) = send(
            router(director, FakeRegistry::default()),
            request(Method::GET, &uri, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "in progress");
        assert_eq!(body["description"], "Instance provisioning in progress");
    }

    #[tokio::test]
    async fn test_quota_denial_is_422() {
        let (status, body) = send(
            router(FakeDirector::default(), FakeRegistry::default()),
            request(
                Method::PUT,
                "/v2/service_instances/inst-1",
                Some(json!({"plan_id": "zero"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["description"],
            "The quota for this service plan has been exceeded. Please contact your Operator for help."
        );
    }

    #[tokio::test]
    async fn test_last_operation_missing_and_malformed_data() {
        let (status, body) = send(
            router(FakeDirector::default(), FakeRegistry::default()),
            request(
                Method::GET,
                "/v2/service_instances/inst-1/last_operation",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let description = body["description"].as_str().unwrap();
        assert!(description.starts_with("There was a problem completing your request."));
        assert!(description.contains("service-instance-guid: inst-1"));

        let (status, body) = send(
            router(FakeDirector::default(), FakeRegistry::default()),
            request(
                Method::GET,
                "/v2/service_instances/inst-1/last_operation?operation=garbage",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["description"], "Operation data could not be decoded");
    }

    #[tokio::test]
    async fn test_director_down_is_500_try_again() {
        let metadata = OperationMetadata::new(OperationType::Update, TaskId::new(5), "small");
        let uri = format!(
            "/v2/service_instances/inst-1/last_operation?operation={}",
            urlencode(&metadata.encode().unwrap())
        );
        let (status, body) = send(
            router(FakeDirector::default().down(), FakeRegistry::default()),
            request(Method::GET, &uri, None),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["description"],
            "Currently unable to reach the director. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_upgrade_trigger_status_codes() {
        let make = || {
            router(
                FakeDirector::default()
                    .with_deployment(DEPLOYMENT, "name: x")
                    .with_incomplete(
                        "service-instance_busy",
                        vec![RemoteTask::new(TaskId::new(1), TaskState::Processing)],
                    )
                    .with_deployment("service-instance_busy", "name: y"),
                FakeRegistry::default()
                    .with_instance("inst-1", "small", false)
                    .with_instance("orphan", "small", false)
                    .with_instance("busy", "small", false),
            )
        };
        let upgrade = |id: &str| {
            request(
                Method::PATCH,
                &format!("/mgmt/service_instances/{}?operation_type=upgrade", id),
                None,
            )
        };

        let (status, body) = send(make(), upgrade("inst-1")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let metadata = OperationMetadata::decode(body["operation"].as_str().unwrap()).unwrap();
        assert_eq!(metadata.operation_type, OperationType::Upgrade);

        assert_eq!(send(make(), upgrade("gone")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(make(), upgrade("orphan")).await.0, StatusCode::GONE);
        assert_eq!(send(make(), upgrade("busy")).await.0, StatusCode::CONFLICT);

        let (status, _) = send(
            make(),
            request(
                Method::PATCH,
                "/mgmt/service_instances/inst-1?operation_type=recreate",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deprovision_missing_deployment_is_410() {
        let (status, _) = send(
            router(FakeDirector::default(), FakeRegistry::default()),
            request(
                Method::DELETE,
                "/v2/service_instances/inst-1?plan_id=small",
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = router(FakeDirector::default(), FakeRegistry::default())
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("fleetbroker_quota_rejections_total 0"));
    }

    fn urlencode(raw: &str) -> String {
        raw.bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    (b as char).to_string()
                }
                other => format!("%{:02X}", other),
            })
            .collect()
    }
}
