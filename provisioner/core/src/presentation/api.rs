// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::application::provisioner::{ProvisionError, Provisioner};
use crate::domain::request::ProvisioningRequest;

pub struct AppState {
    pub provisioner: Arc<dyn Provisioner>,
    pub start_time: Instant,
}

pub fn app(provisioner: Arc<dyn Provisioner>) -> Router {
    let state = Arc::new(AppState {
        provisioner,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/volumes", post(provision_handler))
        .route("/v1/volumes/{name}", delete(delete_handler))
        .route("/v1/volumes/{namespace}/{pv_name}/token", get(token_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for a failed reconciliation.
pub fn status_for(err: &ProvisionError) -> StatusCode {
    match err {
        ProvisionError::InvalidRequest(_) | ProvisionError::Naming(_) => StatusCode::BAD_REQUEST,
        ProvisionError::AmbiguousState(_) => StatusCode::CONFLICT,
        ProvisionError::NotReady { .. } | ProvisionError::Cancelled { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        ProvisionError::Remote { .. } => StatusCode::BAD_GATEWAY,
        ProvisionError::Descriptor(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ProvisionError) -> Response {
    let status = status_for(&err);
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "kind": err.kind(),
        })),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn provision_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProvisioningRequest>, JsonRejection>,
) -> Response {
    // Bodies that fail to deserialize are invalid requests (400)
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": format!("invalid request: {}", rejection.body_text()),
                    "kind": "invalid_request",
                })),
            )
                .into_response();
        }
    };

    match state.provisioner.provision(&request).await {
        Ok(descriptor) => (StatusCode::CREATED, Json(descriptor)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    match state.provisioner.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    #[serde(rename = "pvcName")]
    pvc_name: Option<String>,
}

async fn token_handler(
    State(state): State<Arc<AppState>>,
    Path((namespace, pv_name)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let mut request = ProvisioningRequest::new(namespace, pv_name);
    request.pvc_name = query.pvc_name;

    match state.provisioner.creation_token(&request) {
        Ok(token) => Json(json!({ "token": token })).into_response(),
        Err(e) => error_response(e),
    }
}
