//! Hand-off to the external workflow engine.
//!
//! Lifecycle actions do not touch the cluster themselves: they describe the
//! intended action through parameters and ask a [`WorkflowTrigger`] to execute
//! the workspace template's workflow. Completion is reported back through the
//! engine's own status channel.

use crate::parameter::Parameter;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplateRef {
    pub uid: String,
    pub version: i64,
    pub manifest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecutionRequest {
    pub parameters: Vec<Parameter>,
    pub workflow_template: WorkflowTemplateRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecutionHandle {
    pub name: String,
}

/// Queue state of an execution row. The engine takes rows out of `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
}

#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    /// Start an execution; returns as soon as the engine has accepted it.
    async fn execute(
        &self,
        namespace: &str,
        request: &WorkflowExecutionRequest,
    ) -> anyhow::Result<WorkflowExecutionHandle>;
}

/// Trigger that queues executions in the `workflow_executions` table for the
/// engine to pick up.
#[derive(Clone)]
pub struct QueuedWorkflowTrigger {
    pool: SqlitePool,
}

impl QueuedWorkflowTrigger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Executions still waiting for the engine, oldest first.
    pub async fn pending_executions(&self) -> anyhow::Result<Vec<QueuedExecution>> {
        let rows = sqlx::query_as::<_, QueuedExecutionRow>(
            "SELECT id, namespace, workflow_template_uid, workflow_template_version, parameters, status
             FROM workflow_executions
             WHERE status = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(ExecutionStatus::Pending)
        .fetch_all(&self.pool)
        .await
        .context("loading pending workflow executions")?;

        rows.into_iter().map(QueuedExecution::try_from).collect()
    }
}

#[async_trait]
impl WorkflowTrigger for QueuedWorkflowTrigger {
    #[instrument(skip(self, request), fields(template = %request.workflow_template.uid))]
    async fn execute(
        &self,
        namespace: &str,
        request: &WorkflowExecutionRequest,
    ) -> anyhow::Result<WorkflowExecutionHandle> {
        let name = Uuid::new_v4().to_string();
        let parameters = serde_json::to_string(&request.parameters)?;

        sqlx::query(
            "INSERT INTO workflow_executions (id, namespace, workflow_template_uid, workflow_template_version, parameters, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(namespace)
        .bind(&request.workflow_template.uid)
        .bind(request.workflow_template.version)
        .bind(parameters)
        .bind(ExecutionStatus::Pending)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("queueing workflow execution in {}", namespace))?;

        debug!("Queued workflow execution {}", name);

        Ok(WorkflowExecutionHandle { name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedExecution {
    pub name: String,
    pub namespace: String,
    pub workflow_template_uid: String,
    pub workflow_template_version: i64,
    pub parameters: Vec<Parameter>,
    pub status: ExecutionStatus,
}

#[derive(sqlx::FromRow)]
struct QueuedExecutionRow {
    id: String,
    namespace: String,
    workflow_template_uid: String,
    workflow_template_version: i64,
    parameters: String,
    status: ExecutionStatus,
}

impl TryFrom<QueuedExecutionRow> for QueuedExecution {
    type Error = anyhow::Error;

    fn try_from(row: QueuedExecutionRow) -> anyhow::Result<Self> {
        Ok(Self {
            parameters: serde_json::from_str(&row.parameters)
                .with_context(|| format!("decoding parameters of execution {}", row.id))?,
            name: row.id,
            namespace: row.namespace,
            workflow_template_uid: row.workflow_template_uid,
            workflow_template_version: row.workflow_template_version,
            status: row.status,
        })
    }
}
