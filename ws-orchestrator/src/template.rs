//! Workspace template storage.
//!
//! A template is an identity row per `(namespace, uid)` plus an append-only list
//! of manifest versions. Workspaces bind to one version when they are created.

use crate::db::from_timestamp;
use crate::error::{OrchestratorError, Result, StoreContext};
use crate::workflow::WorkflowTemplateRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};
use ws_core::generate_uid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceTemplate {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub version: i64,
    pub manifest: String,
    /// Creation time of this version
    pub created_at: DateTime<Utc>,
}

impl WorkspaceTemplate {
    /// The workflow definition executed for workspaces bound to this version.
    pub fn workflow_template(&self) -> WorkflowTemplateRef {
        WorkflowTemplateRef {
            uid: self.uid.clone(),
            version: self.version,
            manifest: self.manifest.clone(),
        }
    }
}

/// Outcome of [`upsert_template_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateUpsert {
    pub template: WorkspaceTemplate,
    /// False when the latest version already carried the same manifest.
    pub appended: bool,
}

const TEMPLATE_SELECT: &str = "SELECT wt.id, wt.uid, wt.name, wt.namespace, wtv.version, wtv.manifest, wtv.created_at
     FROM workspace_templates wt
     JOIN workspace_template_versions wtv ON wtv.workspace_template_id = wt.id
     WHERE wt.namespace = ? AND wt.uid = ?";

#[derive(Clone)]
pub struct WorkspaceTemplateStore {
    pool: SqlitePool,
}

impl WorkspaceTemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a template with its first version; fails if the derived uid is taken.
    #[instrument(skip(self, manifest))]
    pub async fn create_workspace_template(
        &self,
        namespace: &str,
        name: &str,
        manifest: &str,
    ) -> Result<WorkspaceTemplate> {
        let uid = generate_uid(name)?;
        if self.get_workspace_template(namespace, &uid, None).await?.is_some() {
            return Err(OrchestratorError::AlreadyExists(
                "Workspace template already exists.".to_string(),
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .store_context(|| "starting workspace template transaction".to_string())?;
        let upsert = upsert_template_version(&mut tx, namespace, name, manifest).await?;
        tx.commit()
            .await
            .store_context(|| format!("creating workspace template {}", uid))?;

        Ok(upsert.template)
    }

    /// Append a new manifest version, creating the template identity if needed.
    #[instrument(skip(self, manifest))]
    pub async fn update_workspace_template(
        &self,
        namespace: &str,
        name: &str,
        manifest: &str,
    ) -> Result<TemplateUpsert> {
        let mut tx = self
            .pool
            .begin()
            .await
            .store_context(|| "starting workspace template transaction".to_string())?;
        let upsert = upsert_template_version(&mut tx, namespace, name, manifest).await?;
        tx.commit()
            .await
            .store_context(|| format!("updating workspace template {}", name))?;

        Ok(upsert)
    }

    /// Look up a template version; `None` selects the latest version.
    pub async fn get_workspace_template(
        &self,
        namespace: &str,
        uid: &str,
        version: Option<i64>,
    ) -> Result<Option<WorkspaceTemplate>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .store_context(|| "acquiring connection".to_string())?;
        fetch_template(&mut conn, namespace, uid, version).await
    }

    /// All versions of a template, newest first.
    pub async fn list_workspace_template_versions(
        &self,
        namespace: &str,
        uid: &str,
    ) -> Result<Vec<WorkspaceTemplate>> {
        let query = format!("{} ORDER BY wtv.version DESC", TEMPLATE_SELECT);
        let rows = sqlx::query_as::<_, TemplateRow>(&query)
            .bind(namespace)
            .bind(uid)
            .fetch_all(&self.pool)
            .await
            .store_context(|| format!("listing versions of workspace template {}", uid))?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }
}

pub(crate) async fn fetch_template(
    conn: &mut SqliteConnection,
    namespace: &str,
    uid: &str,
    version: Option<i64>,
) -> Result<Option<WorkspaceTemplate>> {
    let mut query = TEMPLATE_SELECT.to_string();
    if version.is_some() {
        query.push_str(" AND wtv.version = ?");
    }
    query.push_str(" ORDER BY wtv.version DESC LIMIT 1");

    let mut q = sqlx::query_as::<_, TemplateRow>(&query)
        .bind(namespace)
        .bind(uid);
    if let Some(version) = version {
        q = q.bind(version);
    }

    let row = q
        .fetch_optional(&mut *conn)
        .await
        .store_context(|| format!("loading workspace template {}", uid))?;

    Ok(row.map(|row| row.into()))
}

/// Make `manifest` the latest version of the template called `name`.
///
/// Runs on the caller's connection so it can join a wider transaction. A new
/// version is only appended when the manifest differs from the latest one,
/// which makes repeated calls with the same input a no-op.
pub async fn upsert_template_version(
    conn: &mut SqliteConnection,
    namespace: &str,
    name: &str,
    manifest: &str,
) -> Result<TemplateUpsert> {
    let uid = generate_uid(name)?;
    let now = Utc::now().timestamp();

    let existing_id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM workspace_templates WHERE namespace = ? AND uid = ?",
    )
    .bind(namespace)
    .bind(&uid)
    .fetch_optional(&mut *conn)
    .await
    .store_context(|| format!("loading workspace template {}", uid))?;

    let template_id = match existing_id {
        Some(id) => id,
        None => {
            debug!("Creating workspace template {} in {}", uid, namespace);
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO workspace_templates (uid, name, namespace, created_at)
                 VALUES (?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(&uid)
            .bind(name)
            .bind(namespace)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .store_context(|| format!("inserting workspace template {}", uid))?
        }
    };

    let latest = sqlx::query_as::<_, (i64, String)>(
        "SELECT version, manifest FROM workspace_template_versions
         WHERE workspace_template_id = ?
         ORDER BY version DESC LIMIT 1",
    )
    .bind(template_id)
    .fetch_optional(&mut *conn)
    .await
    .store_context(|| format!("loading latest version of workspace template {}", uid))?;

    let appended = match &latest {
        Some((_, current)) if current == manifest => {
            debug!("Workspace template {} in {} is already current", uid, namespace);
            false
        }
        _ => {
            let version = latest.as_ref().map_or(1, |(v, _)| v + 1);
            sqlx::query(
                "INSERT INTO workspace_template_versions (workspace_template_id, version, manifest, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(template_id)
            .bind(version)
            .bind(manifest)
            .bind(now)
            .execute(&mut *conn)
            .await
            .store_context(|| format!("inserting version {} of workspace template {}", version, uid))?;

            info!(
                "Workspace template {} in {} is now at version {}",
                uid, namespace, version
            );
            true
        }
    };

    let template = fetch_template(conn, namespace, &uid, None)
        .await?
        .ok_or_else(|| OrchestratorError::NotFound("Workspace template not found.".to_string()))?;

    Ok(TemplateUpsert { template, appended })
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    uid: String,
    name: String,
    namespace: String,
    version: i64,
    manifest: String,
    created_at: i64,
}

impl From<TemplateRow> for WorkspaceTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            uid: row.uid,
            name: row.name,
            namespace: row.namespace,
            version: row.version,
            manifest: row.manifest,
            created_at: from_timestamp(row.created_at),
        }
    }
}
