//! Common test utilities and helpers for ws-api tests

#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use std::sync::Arc;
use tower::ServiceExt;
use ws_api::{create_app, AppState};
use ws_orchestrator::test_utils::{create_test_db, test_registry, RecordingWorkflowTrigger};
use ws_orchestrator::{CreateWorkspaceRequest, Parameter, Workspace, WorkspaceOrchestrator};

pub const NAMESPACE: &str = "team-a";

/// App backed by an in-memory database with a `jupyterlab` template in [`NAMESPACE`]
pub async fn create_test_app() -> (Router, WorkspaceOrchestrator, RecordingWorkflowTrigger) {
    let pool = create_test_db().await;
    let trigger = RecordingWorkflowTrigger::new();
    let orchestrator = WorkspaceOrchestrator::new(
        pool,
        Arc::new(test_registry("example.com", &[(NAMESPACE, false)])),
        Arc::new(trigger.clone()),
    );

    orchestrator
        .templates()
        .create_workspace_template(NAMESPACE, "JupyterLab", "containers: []\n")
        .await
        .expect("Failed to create workspace template");

    let app = create_app(AppState::new(orchestrator.clone()));
    (app, orchestrator, trigger)
}

pub fn create_test_workspace_request(name: &str) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        name: name.to_string(),
        parameters: vec![Parameter::new("sys-name", name)],
        workspace_template_uid: "jupyterlab".to_string(),
        workspace_template_version: None,
    }
}

/// Fixture: Create a workspace directly through the orchestrator
pub async fn fixture_workspace(orchestrator: &WorkspaceOrchestrator, name: &str) -> Workspace {
    orchestrator
        .create_workspace(NAMESPACE, create_test_workspace_request(name))
        .await
        .expect("Failed to create fixture workspace")
}

pub fn workspaces_uri(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/workspaces", namespace)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<String>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json)
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
