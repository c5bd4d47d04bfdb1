//! Versioned data migrations over stored workspace templates.
//!
//! Schema changes are handled by `sqlx::migrate!` (see [`crate::db`]). The
//! migrations here rewrite data and are tracked in the `data_migrations`
//! ledger. A migration whose id is in the ledger never runs its `up` body
//! again. The body and the ledger row are committed in one transaction.
//!
//! Runs are expected to happen from a single process at startup; the primary
//! key on the ledger makes a racing second runner roll back instead of
//! applying twice.

use crate::error::{is_unique_violation, OrchestratorError, Result, StoreContext};
use crate::namespace::NamespaceConfigProvider;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub mod m20200724220450_update_cvat_workspace;

pub use m20200724220450_update_cvat_workspace::UpdateCvatWorkspace;

/// What a migration body gets to work with.
pub struct MigrationContext<'a> {
    /// Connection inside the migration's transaction.
    pub conn: &'a mut SqliteConnection,
    pub namespaces: &'a dyn NamespaceConfigProvider,
}

#[async_trait]
pub trait Migration: Send + Sync {
    /// Ledger key, conventionally a `YYYYMMDDHHMMSS` timestamp.
    fn id(&self) -> i64;

    fn description(&self) -> &'static str;

    async fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;

    async fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    NotApplied,
}

/// Every data migration shipped with this crate, in id order.
pub fn builtin_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(UpdateCvatWorkspace)]
}

pub struct MigrationRunner {
    pool: SqlitePool,
    namespaces: Arc<dyn NamespaceConfigProvider>,
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool, namespaces: Arc<dyn NamespaceConfigProvider>) -> Self {
        Self {
            pool,
            namespaces,
            migrations: Vec::new(),
        }
    }

    /// Runner with [`builtin_migrations`] registered.
    pub fn with_builtin_migrations(
        pool: SqlitePool,
        namespaces: Arc<dyn NamespaceConfigProvider>,
    ) -> Self {
        let mut runner = Self::new(pool, namespaces);
        for migration in builtin_migrations() {
            runner.register(migration);
        }
        runner
    }

    /// Register a migration. Registering an id a second time is a no-op.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> &mut Self {
        let id = migration.id();
        if self.migrations.iter().any(|m| m.id() == id) {
            debug!("Migration {} already registered", id);
            return self;
        }

        let position = self
            .migrations
            .iter()
            .position(|m| m.id() > id)
            .unwrap_or(self.migrations.len());
        self.migrations.insert(position, migration);
        self
    }

    /// Registered migration ids in ascending order.
    pub fn registered(&self) -> Vec<i64> {
        self.migrations.iter().map(|m| m.id()).collect()
    }

    /// Ids recorded in the ledger.
    pub async fn applied_migrations(&self) -> Result<BTreeSet<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM data_migrations")
            .fetch_all(&self.pool)
            .await
            .store_context(|| "loading applied data migrations".to_string())?;

        Ok(ids.into_iter().collect())
    }

    /// Apply one migration unless the ledger already has it.
    #[instrument(skip(self))]
    pub async fn apply(&self, id: i64) -> Result<ApplyOutcome> {
        let migration = self.find(id)?;

        if self.applied_migrations().await?.contains(&id) {
            debug!("Migration {} already applied", id);
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        info!("Running migration {}: {}", id, migration.description());

        let mut tx = self
            .pool
            .begin()
            .await
            .store_context(|| format!("starting transaction for migration {}", id))?;

        {
            let mut ctx = MigrationContext {
                conn: &mut *tx,
                namespaces: self.namespaces.as_ref(),
            };
            migration.up(&mut ctx).await.map_err(|e| {
                warn!("Migration {} failed: {}", id, e);
                into_migration_error(id, e)
            })?;
        }

        let recorded = sqlx::query(
            "INSERT INTO data_migrations (id, description, applied_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(migration.description())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await;

        match recorded {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // Another runner got there first; dropping tx rolls our changes back
                warn!("Migration {} was applied concurrently, discarding this run", id);
                return Ok(ApplyOutcome::AlreadyApplied);
            }
            Err(e) => {
                return Err(OrchestratorError::Store {
                    context: format!("recording migration {}", id),
                    source: e,
                })
            }
        }

        tx.commit()
            .await
            .store_context(|| format!("committing migration {}", id))?;

        info!("Migration {} completed successfully", id);

        Ok(ApplyOutcome::Applied)
    }

    /// Apply every registered migration missing from the ledger, in id order.
    /// Stops at the first failure.
    pub async fn apply_pending(&self) -> Result<Vec<i64>> {
        let applied = self.applied_migrations().await?;
        let mut newly_applied = Vec::new();

        for id in self.registered() {
            if applied.contains(&id) {
                continue;
            }
            if self.apply(id).await? == ApplyOutcome::Applied {
                newly_applied.push(id);
            }
        }

        Ok(newly_applied)
    }

    /// Run the `down` body and drop the ledger entry in one transaction.
    #[instrument(skip(self))]
    pub async fn rollback(&self, id: i64) -> Result<RollbackOutcome> {
        let migration = self.find(id)?;

        if !self.applied_migrations().await?.contains(&id) {
            debug!("Migration {} is not applied, nothing to roll back", id);
            return Ok(RollbackOutcome::NotApplied);
        }

        info!("Rolling back migration {}: {}", id, migration.description());

        let mut tx = self
            .pool
            .begin()
            .await
            .store_context(|| format!("starting transaction for migration {}", id))?;

        {
            let mut ctx = MigrationContext {
                conn: &mut *tx,
                namespaces: self.namespaces.as_ref(),
            };
            migration
                .down(&mut ctx)
                .await
                .map_err(|e| into_migration_error(id, e))?;
        }

        sqlx::query("DELETE FROM data_migrations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .store_context(|| format!("removing migration {} from the ledger", id))?;

        tx.commit()
            .await
            .store_context(|| format!("committing rollback of migration {}", id))?;

        Ok(RollbackOutcome::RolledBack)
    }

    fn find(&self, id: i64) -> Result<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
            .ok_or_else(|| OrchestratorError::NotFound(format!("Migration {} is not registered.", id)))
    }
}

fn into_migration_error(id: i64, err: OrchestratorError) -> OrchestratorError {
    match err {
        OrchestratorError::DataMigration { .. } => err,
        other => OrchestratorError::DataMigration {
            id,
            message: other.to_string(),
        },
    }
}
