use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use ws_orchestrator::{CreateWorkspaceRequest, PaginationRequest, Workspace};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/namespaces/{namespace}/workspaces",
            get(list_workspaces).post(create_workspace),
        )
        .route(
            "/api/v1/namespaces/{namespace}/workspaces/{uid}",
            get(get_workspace).delete(delete_workspace),
        )
        .route(
            "/api/v1/namespaces/{namespace}/workspaces/{uid}/pause",
            put(pause_workspace),
        )
}

async fn create_workspace(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<Workspace>)> {
    let workspace = state.orchestrator.create_workspace(&namespace, req).await?;

    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn list_workspaces(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(pagination): Query<PaginationRequest>,
) -> ApiResult<Json<Vec<Workspace>>> {
    let workspaces = state
        .orchestrator
        .list_workspaces(&namespace, &pagination)
        .await?;

    Ok(Json(workspaces))
}

async fn get_workspace(
    State(state): State<AppState>,
    Path((namespace, uid)): Path<(String, String)>,
) -> ApiResult<Json<Workspace>> {
    let workspace = state
        .orchestrator
        .get_workspace(&namespace, &uid)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found.".to_string()))?;

    Ok(Json(workspace))
}

async fn pause_workspace(
    State(state): State<AppState>,
    Path((namespace, uid)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state.orchestrator.pause_workspace(&namespace, &uid).await?;

    Ok(Json(json!({ "message": "Workspace pausing" })))
}

async fn delete_workspace(
    State(state): State<AppState>,
    Path((namespace, uid)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state.orchestrator.delete_workspace(&namespace, &uid).await?;

    Ok(Json(json!({ "message": "Workspace terminating" })))
}
