// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP request handlers.
//!
//! Required-field validation happens here, once, before the core is
//! invoked; the core can assume well-formed keys.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use deckhand_core::Error as CoreError;
use deckhand_core::lifecycle::{CreateRequest, LifecycleManager};
use deckhand_core::registry::InstanceKey;
use deckhand_core::router::Router as RegistryRouter;

/// Shared state for HTTP handlers.
pub struct AppState {
    /// Write side of the core.
    pub lifecycle: Arc<LifecycleManager>,
    /// Read side of the core.
    pub instances: RegistryRouter,
    /// Host used when building dashboard URLs for redirects.
    pub public_host: String,
}

/// Core error carried to the HTTP boundary.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::OperationInFlight(_) => StatusCode::CONFLICT,
            CoreError::PortsExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(status = %status, error = %self.0, "Request failed");
        } else {
            debug!(status = %status, error = %self.0, "Request rejected");
        }

        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

/// Body of `POST /create_dashboard`.
#[derive(Debug, Deserialize)]
pub struct CreateDashboardRequest {
    /// Owning user. Required.
    pub user_id: Option<String>,
    /// Dashboard identifier. Required.
    pub dashboard_id: Option<String>,
    /// Human-readable description. Required.
    pub description: Option<String>,
    /// Optional host path of a data source file to mount read-only.
    pub data_source_path: Option<String>,
}

/// Response of `POST /create_dashboard`.
#[derive(Debug, Serialize)]
pub struct CreateDashboardResponse {
    /// Outcome message.
    pub message: String,
    /// URL the dashboard is reachable at.
    pub dashboard_url: String,
    /// Canonical `user_id:dashboard_id` key.
    pub dashboard_key: String,
    /// Host port the worker is published on.
    pub port: u16,
}

/// Body of `POST /remove_dashboard`.
#[derive(Debug, Deserialize)]
pub struct RemoveDashboardRequest {
    /// Owning user. Required.
    pub user_id: Option<String>,
    /// Dashboard identifier. Required.
    pub dashboard_id: Option<String>,
}

/// Plain outcome message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Outcome message.
    pub message: String,
}

/// Query of `GET /list_dashboards`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// User whose dashboards to list. Required.
    pub user_id: Option<String>,
}

/// Response of `GET /list_dashboards`.
#[derive(Debug, Serialize)]
pub struct ListDashboardsResponse {
    /// `dashboard_id -> port` for the requested user.
    pub dashboards: BTreeMap<String, u16>,
}

/// Response of `GET /`.
#[derive(Debug, Serialize)]
pub struct ListAllResponse {
    /// `user_id:dashboard_id -> port` for every running instance.
    pub running_dashboards: BTreeMap<String, u16>,
}

fn required_key(
    user_id: Option<String>,
    dashboard_id: Option<String>,
) -> Result<InstanceKey, ApiError> {
    InstanceKey::new(user_id.unwrap_or_default(), dashboard_id.unwrap_or_default())
        .map_err(ApiError::from)
}

/// Handle `POST /create_dashboard`.
pub async fn create_dashboard(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDashboardRequest>,
) -> Result<Json<CreateDashboardResponse>, ApiError> {
    let key = required_key(body.user_id, body.dashboard_id)?;
    let description = body
        .description
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError(CoreError::InvalidRequest("description is required".into())))?;

    let created = state
        .lifecycle
        .create(CreateRequest {
            key,
            description,
            data_source_host_path: body.data_source_path.map(PathBuf::from),
        })
        .await?;

    Ok(Json(CreateDashboardResponse {
        message: "Dashboard created".to_string(),
        dashboard_url: created.url,
        dashboard_key: created.key.to_string(),
        port: created.port,
    }))
}

/// Handle `POST /remove_dashboard`.
pub async fn remove_dashboard(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RemoveDashboardRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = required_key(body.user_id, body.dashboard_id)?;
    state.lifecycle.remove(&key).await?;

    Ok(Json(MessageResponse {
        message: format!(
            "Dashboard '{}' removed for user '{}'",
            key.dashboard_id(),
            key.user_id()
        ),
    }))
}

/// Handle `GET /list_dashboards`.
pub async fn list_dashboards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListDashboardsResponse>, ApiError> {
    let user_id = query.user_id.filter(|u| !u.is_empty()).ok_or_else(|| {
        ApiError(CoreError::InvalidRequest(
            "user_id query parameter is required".into(),
        ))
    })?;

    Ok(Json(ListDashboardsResponse {
        dashboards: state.instances.list_for_user(&user_id).await,
    }))
}

/// Handle `GET /dashboard/{user_id}/{dashboard_id}`: redirect to the
/// instance URL.
pub async fn route_dashboard(
    State(state): State<Arc<AppState>>,
    Path((user_id, dashboard_id)): Path<(String, String)>,
) -> Result<Redirect, ApiError> {
    let key = InstanceKey::new(user_id, dashboard_id)?;
    let port = state.instances.resolve(&key).await?;

    Ok(Redirect::temporary(&format!(
        "http://{}:{}/",
        state.public_host, port
    )))
}

/// Handle `GET /`: all running instances, for debugging.
pub async fn index(State(state): State<Arc<AppState>>) -> Json<ListAllResponse> {
    Json(ListAllResponse {
        running_dashboards: state.instances.list_all().await,
    })
}
