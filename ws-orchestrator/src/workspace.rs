use crate::db::from_timestamp;
use crate::error::{is_unique_violation, OrchestratorError, Result, StoreContext};
use crate::namespace::{NamespaceConfigProvider, SystemConfig};
use crate::pagination::PaginationRequest;
use crate::parameter::{
    parameter_value, Parameter, INJECTED_PARAMETERS, SYS_HOST, SYS_NAME, SYS_RESOURCE_ACTION,
    SYS_UID, SYS_WORKSPACE_ACTION,
};
use crate::template::{WorkspaceTemplate, WorkspaceTemplateStore};
use crate::workflow::{WorkflowExecutionHandle, WorkflowExecutionRequest, WorkflowTrigger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use ws_core::generate_uid;
use ws_core::validation::{
    validate_namespace, validate_parameter_name, validate_required, validate_uid,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub phase: WorkspacePhase,
    pub parameters: Vec<Parameter>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub workspace_template: WorkspaceTemplateRef,
}

/// The template version a workspace is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceTemplateRef {
    pub id: i64,
    pub uid: String,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum WorkspacePhase {
    Started,
    Pausing,
    Paused,
    Terminating,
    Terminated,
}

impl fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspacePhase::Started => "started",
            WorkspacePhase::Pausing => "pausing",
            WorkspacePhase::Paused => "paused",
            WorkspacePhase::Terminating => "terminating",
            WorkspacePhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub workspace_template_uid: String,
    /// Latest template version when absent
    #[serde(default)]
    pub workspace_template_version: Option<i64>,
}

/// Drives workspace records through their phases and asks the workflow engine
/// to carry out each action.
#[derive(Clone)]
pub struct WorkspaceOrchestrator {
    pool: SqlitePool,
    templates: WorkspaceTemplateStore,
    namespaces: Arc<dyn NamespaceConfigProvider>,
    workflows: Arc<dyn WorkflowTrigger>,
}

impl WorkspaceOrchestrator {
    pub fn new(
        pool: SqlitePool,
        namespaces: Arc<dyn NamespaceConfigProvider>,
        workflows: Arc<dyn WorkflowTrigger>,
    ) -> Self {
        Self {
            templates: WorkspaceTemplateStore::new(pool.clone()),
            pool,
            namespaces,
            workflows,
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn templates(&self) -> &WorkspaceTemplateStore {
        &self.templates
    }

    /// Create a workspace and trigger the workflow that provisions it.
    ///
    /// The workflow is triggered before the row is written. If the insert then
    /// fails the caller sees the error while the execution may already be running;
    /// the engine's status reporting reconciles that case.
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create_workspace(
        &self,
        namespace: &str,
        req: CreateWorkspaceRequest,
    ) -> Result<Workspace> {
        let config = self.namespaces.system_config().await?;

        let mut name = req.name;
        let mut parameters = req.parameters;
        let uid = inject_system_parameters(
            namespace,
            &mut name,
            &mut parameters,
            "create",
            "apply",
            &config,
        )?;

        if self.find_active_workspace(namespace, &uid).await?.is_some() {
            return Err(OrchestratorError::AlreadyExists(
                "Workspace already exists.".to_string(),
            ));
        }

        validate_workspace(
            namespace,
            &name,
            &uid,
            &parameters,
            &req.workspace_template_uid,
        )
        .map_err(|e| OrchestratorError::InvalidArgument(e.to_string()))?;

        let template = self
            .templates
            .get_workspace_template(
                namespace,
                &req.workspace_template_uid,
                req.workspace_template_version,
            )
            .await?
            .ok_or_else(template_not_found)?;

        let execution = self
            .trigger_workflow(namespace, parameters.clone(), &template, "creating")
            .await?;
        debug!("Workspace {} provisioning via {}", uid, execution.name);

        let now = Utc::now();
        let encoded = serde_json::to_string(&parameters)?;
        let (id, created_at) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            INSERT INTO workspaces (uid, name, namespace, phase, parameters, started_at, created_at, workspace_template_id, workspace_template_version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, created_at
            "#,
        )
        .bind(&uid)
        .bind(&name)
        .bind(namespace)
        .bind(WorkspacePhase::Started)
        .bind(encoded)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .bind(template.id)
        .bind(template.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                OrchestratorError::AlreadyExists("Workspace already exists.".to_string())
            } else {
                OrchestratorError::Store {
                    context: format!("inserting workspace {}", uid),
                    source: e,
                }
            }
        })?;

        info!("Workspace {} created in {}", uid, namespace);

        Ok(Workspace {
            id,
            uid,
            name,
            namespace: namespace.to_string(),
            phase: WorkspacePhase::Started,
            parameters,
            started_at: Some(from_timestamp(now.timestamp())),
            paused_at: None,
            terminated_at: None,
            created_at: from_timestamp(created_at),
            workspace_template: WorkspaceTemplateRef {
                id: template.id,
                uid: template.uid,
                version: template.version,
            },
        })
    }

    /// Look up a workspace; `Ok(None)` when it does not exist.
    ///
    /// When a uid has been reused, the active workspace wins over terminated ones.
    pub async fn get_workspace(&self, namespace: &str, uid: &str) -> Result<Option<Workspace>> {
        let query = format!(
            "{} WHERE w.namespace = ? AND w.uid = ?
             ORDER BY (w.phase = 'terminated') ASC, w.created_at DESC, w.id DESC
             LIMIT 1",
            WORKSPACE_SELECT
        );

        let row = sqlx::query_as::<_, WorkspaceRow>(&query)
            .bind(namespace)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .store_context(|| format!("loading workspace {}", uid))?;

        row.map(Workspace::try_from).transpose()
    }

    /// Workspaces in a namespace, newest first.
    pub async fn list_workspaces(
        &self,
        namespace: &str,
        pagination: &PaginationRequest,
    ) -> Result<Vec<Workspace>> {
        let query = format!(
            "{} WHERE w.namespace = ?
             ORDER BY w.created_at DESC, w.id DESC
             LIMIT ? OFFSET ?",
            WORKSPACE_SELECT
        );

        let rows = sqlx::query_as::<_, WorkspaceRow>(&query)
            .bind(namespace)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .store_context(|| format!("listing workspaces in {}", namespace))?;

        rows.into_iter().map(Workspace::try_from).collect()
    }

    pub async fn pause_workspace(&self, namespace: &str, uid: &str) -> Result<()> {
        self.update_workspace(namespace, uid, "pause", "delete", WorkspacePhase::Pausing)
            .await
    }

    pub async fn delete_workspace(&self, namespace: &str, uid: &str) -> Result<()> {
        self.update_workspace(namespace, uid, "delete", "delete", WorkspacePhase::Terminating)
            .await
    }

    /// Move a workspace to `phase`, also used by the workflow engine to report progress.
    ///
    /// Only the timestamp of the phase being entered is kept. Terminated workspaces
    /// never change again; updating one (or a missing one) is `NotFound`.
    #[instrument(skip(self))]
    pub async fn update_workspace_status(
        &self,
        namespace: &str,
        uid: &str,
        phase: WorkspacePhase,
    ) -> Result<()> {
        let (started_at, paused_at, terminated_at) = match phase {
            WorkspacePhase::Started => ("?", "NULL", "NULL"),
            WorkspacePhase::Pausing => ("NULL", "?", "NULL"),
            WorkspacePhase::Paused => ("NULL", "COALESCE(paused_at, ?)", "NULL"),
            WorkspacePhase::Terminating => ("NULL", "NULL", "?"),
            WorkspacePhase::Terminated => ("NULL", "NULL", "COALESCE(terminated_at, ?)"),
        };

        let query = format!(
            "UPDATE workspaces
             SET phase = ?, started_at = {}, paused_at = {}, terminated_at = {}
             WHERE namespace = ? AND uid = ? AND phase <> ?",
            started_at, paused_at, terminated_at
        );

        let result = sqlx::query(&query)
            .bind(phase)
            .bind(Utc::now().timestamp())
            .bind(namespace)
            .bind(uid)
            .bind(WorkspacePhase::Terminated)
            .execute(&self.pool)
            .await
            .store_context(|| format!("updating workspace {} to {}", uid, phase))?;

        if result.rows_affected() == 0 {
            warn!("No active workspace {} in {} to move to {}", uid, namespace, phase);
            return Err(workspace_not_found());
        }

        Ok(())
    }

    async fn update_workspace(
        &self,
        namespace: &str,
        uid: &str,
        workspace_action: &str,
        resource_action: &str,
        phase: WorkspacePhase,
    ) -> Result<()> {
        let workspace = self
            .get_workspace(namespace, uid)
            .await?
            .ok_or_else(workspace_not_found)?;

        let config = self.namespaces.system_config().await?;

        let mut name = workspace.name.clone();
        let mut parameters = workspace.parameters.clone();
        inject_system_parameters(
            namespace,
            &mut name,
            &mut parameters,
            workspace_action,
            resource_action,
            &config,
        )?;

        self.update_workspace_status(namespace, uid, phase).await?;

        let template = self
            .templates
            .get_workspace_template(
                namespace,
                &workspace.workspace_template.uid,
                Some(workspace.workspace_template.version),
            )
            .await?
            .ok_or_else(template_not_found)?;

        self.trigger_workflow(namespace, parameters, &template, workspace_action)
            .await?;

        info!("Workspace {} in {} is {}", uid, namespace, phase);

        Ok(())
    }

    async fn find_active_workspace(&self, namespace: &str, uid: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM workspaces WHERE namespace = ? AND uid = ? AND phase <> ?",
        )
        .bind(namespace)
        .bind(uid)
        .bind(WorkspacePhase::Terminated)
        .fetch_optional(&self.pool)
        .await
        .store_context(|| format!("checking for existing workspace {}", uid))
    }

    async fn trigger_workflow(
        &self,
        namespace: &str,
        parameters: Vec<Parameter>,
        template: &WorkspaceTemplate,
        action: &str,
    ) -> Result<WorkflowExecutionHandle> {
        let request = WorkflowExecutionRequest {
            parameters,
            workflow_template: template.workflow_template(),
        };

        self.workflows
            .execute(namespace, &request)
            .await
            .map_err(|source| OrchestratorError::Workflow {
                context: format!("{} workspace in {}", action, namespace),
                source,
            })
    }
}

/// Apply `sys-name`, replace the injected system parameters and return the derived uid.
///
/// Previously injected values are dropped first, so re-injecting on a stored
/// parameter list only changes the action pair.
pub fn inject_system_parameters(
    namespace: &str,
    name: &mut String,
    parameters: &mut Vec<Parameter>,
    workspace_action: &str,
    resource_action: &str,
    config: &SystemConfig,
) -> Result<String> {
    if let Some(display_name) = parameter_value(parameters, SYS_NAME) {
        *name = display_name.to_string();
    }

    let host = format!("{}--{}.{}", name, namespace, config.domain()?);
    let uid = generate_uid(name)?;

    parameters.retain(|p| !INJECTED_PARAMETERS.contains(&p.name.as_str()));
    parameters.extend([
        Parameter::new(SYS_UID, uid.as_str()),
        Parameter::new(SYS_WORKSPACE_ACTION, workspace_action),
        Parameter::new(SYS_RESOURCE_ACTION, resource_action),
        Parameter::new(SYS_HOST, host),
    ]);

    Ok(uid)
}

fn validate_workspace(
    namespace: &str,
    name: &str,
    uid: &str,
    parameters: &[Parameter],
    template_uid: &str,
) -> ws_core::Result<()> {
    validate_namespace(namespace)?;
    validate_required("name", name)?;
    validate_uid(uid)?;
    validate_required("workspace template uid", template_uid)?;

    // sys-host embeds the display name; only the uid must be cluster safe
    for parameter in parameters {
        validate_parameter_name(&parameter.name)?;
    }

    Ok(())
}

fn workspace_not_found() -> OrchestratorError {
    OrchestratorError::NotFound("Workspace not found.".to_string())
}

fn template_not_found() -> OrchestratorError {
    OrchestratorError::NotFound("Workspace template not found.".to_string())
}

const WORKSPACE_SELECT: &str = "SELECT w.id, w.uid, w.name, w.namespace, w.phase, w.parameters,
            w.started_at, w.paused_at, w.terminated_at, w.created_at,
            w.workspace_template_id, wt.uid AS workspace_template_uid, w.workspace_template_version
     FROM workspaces w
     JOIN workspace_templates wt ON wt.id = w.workspace_template_id";

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: i64,
    uid: String,
    name: String,
    namespace: String,
    phase: WorkspacePhase,
    parameters: String,
    started_at: Option<i64>,
    paused_at: Option<i64>,
    terminated_at: Option<i64>,
    created_at: i64,
    workspace_template_id: i64,
    workspace_template_uid: String,
    workspace_template_version: i64,
}

impl TryFrom<WorkspaceRow> for Workspace {
    type Error = OrchestratorError;

    fn try_from(row: WorkspaceRow) -> Result<Self> {
        Ok(Self {
            parameters: serde_json::from_str(&row.parameters)?,
            id: row.id,
            uid: row.uid,
            name: row.name,
            namespace: row.namespace,
            phase: row.phase,
            started_at: row.started_at.map(from_timestamp),
            paused_at: row.paused_at.map(from_timestamp),
            terminated_at: row.terminated_at.map(from_timestamp),
            created_at: from_timestamp(row.created_at),
            workspace_template: WorkspaceTemplateRef {
                id: row.workspace_template_id,
                uid: row.workspace_template_uid,
                version: row.workspace_template_version,
            },
        })
    }
}
