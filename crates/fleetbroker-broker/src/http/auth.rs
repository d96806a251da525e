//! HTTP basic auth for marketplace and operator routes.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::warn;

use crate::http::responses::ErrorResponse;
use crate::state::AppState;

/// Reject requests that do not carry the configured broker credentials.
pub async fn basic_auth(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config;
    if credentials(req.headers())
        .is_some_and(|(user, pass)| user == config.username && pass == config.password)
    {
        return next.run(req).await;
    }

    warn!(path = %req.uri().path(), "Rejected request with missing or bad credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"fleetbroker\"")],
        Json(ErrorResponse::new("Unauthorized")),
    )
        .into_response()
}

fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
