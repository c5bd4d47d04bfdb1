use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SERVICE: &str = "ws-api";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl HealthStatus {
    fn new(status: &str, database: Option<&str>) -> Self {
        Self {
            status: status.to_string(),
            service: SERVICE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: database.map(str::to_string),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
}

/// The process is up; says nothing about the database.
async fn liveness() -> Json<HealthStatus> {
    Json(HealthStatus::new("ok", None))
}

/// 503 until the workspace store answers a query.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM data_migrations")
        .fetch_one(state.orchestrator.pool())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthStatus::new("ready", Some("connected"))),
        ),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus::new("not_ready", Some("disconnected"))),
            )
        }
    }
}
