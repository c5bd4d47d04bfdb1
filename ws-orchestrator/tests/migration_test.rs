//! Data migration tests
//!
//! Covers the migration ledger and the CVAT v4 template upgrade.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use ws_orchestrator::migration::m20200724220450_update_cvat_workspace::{
    cvat_manifest, CVAT_TEMPLATE_NAME,
};
use ws_orchestrator::test_utils::{create_test_db, test_registry};
use ws_orchestrator::{
    ApplyOutcome, Migration, MigrationContext, MigrationRunner, NamespaceConfig,
    NamespaceConfigProvider, NamespaceRegistry, OrchestratorError, RollbackOutcome,
    WorkspaceTemplateStore,
};

const CVAT_MIGRATION: i64 = 20200724220450;

/// Counts how often its body runs.
struct CountingMigration {
    id: i64,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Migration for CountingMigration {
    fn id(&self) -> i64 {
        self.id
    }

    fn description(&self) -> &'static str {
        "counting migration"
    }

    async fn up(&self, _ctx: &mut MigrationContext<'_>) -> ws_orchestrator::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn down(&self, _ctx: &mut MigrationContext<'_>) -> ws_orchestrator::Result<()> {
        Ok(())
    }
}

/// Lists namespaces whose config can't be loaded.
struct BrokenProvider;

#[async_trait]
impl NamespaceConfigProvider for BrokenProvider {
    async fn list_enabled_namespaces(
        &self,
    ) -> ws_orchestrator::Result<Vec<ws_orchestrator::Namespace>> {
        Ok(vec![
            ws_orchestrator::Namespace {
                name: "team-a".to_string(),
            },
            ws_orchestrator::Namespace {
                name: "team-b".to_string(),
            },
        ])
    }

    async fn namespace_config(&self, namespace: &str) -> ws_orchestrator::Result<NamespaceConfig> {
        if namespace == "team-a" {
            Ok(NamespaceConfig::default())
        } else {
            Err(OrchestratorError::Config(format!(
                "config map for {} is unreadable",
                namespace
            )))
        }
    }

    async fn system_config(&self) -> ws_orchestrator::Result<ws_orchestrator::SystemConfig> {
        Ok(ws_orchestrator::SystemConfig::default())
    }
}

#[tokio::test]
async fn test_cvat_migration_uses_namespace_storage() {
    let pool = create_test_db().await;
    let registry = test_registry("example.com", &[("team-a", true), ("team-b", false)]);
    let runner = MigrationRunner::with_builtin_migrations(pool.clone(), Arc::new(registry));

    let outcome = runner.apply(CVAT_MIGRATION).await.expect("Migration failed");
    assert_eq!(outcome, ApplyOutcome::Applied);

    let store = WorkspaceTemplateStore::new(pool);

    let team_a = store
        .get_workspace_template("team-a", "cvat", None)
        .await
        .unwrap()
        .expect("CVAT template should exist in team-a");
    assert_eq!(team_a.name, CVAT_TEMPLATE_NAME);
    assert_eq!(team_a.manifest, cvat_manifest("gcs"));
    assert!(team_a.manifest.contains("onepanel/filesyncer:gcs"));

    let team_b = store
        .get_workspace_template("team-b", "cvat", None)
        .await
        .unwrap()
        .expect("CVAT template should exist in team-b");
    assert_eq!(team_b.manifest, cvat_manifest("s3"));
}

#[tokio::test]
async fn test_cvat_migration_appends_to_existing_template() {
    let pool = create_test_db().await;
    let store = WorkspaceTemplateStore::new(pool.clone());
    store
        .create_workspace_template("team-a", CVAT_TEMPLATE_NAME, "old manifest")
        .await
        .unwrap();

    let registry = test_registry("example.com", &[("team-a", false)]);
    let runner = MigrationRunner::with_builtin_migrations(pool, Arc::new(registry));
    runner.apply(CVAT_MIGRATION).await.unwrap();

    let versions = store
        .list_workspace_template_versions("team-a", "cvat")
        .await
        .unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, 2);
    assert_eq!(versions[0].manifest, cvat_manifest("s3"));
    assert_eq!(versions[1].manifest, "old manifest");
}

#[tokio::test]
async fn test_migration_runs_once() {
    let pool = create_test_db().await;
    let registry = test_registry("example.com", &[("team-a", false)]);
    let runner = MigrationRunner::with_builtin_migrations(pool.clone(), Arc::new(registry));

    assert_eq!(runner.apply(CVAT_MIGRATION).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(
        runner.apply(CVAT_MIGRATION).await.unwrap(),
        ApplyOutcome::AlreadyApplied
    );

    let versions = WorkspaceTemplateStore::new(pool)
        .list_workspace_template_versions("team-a", "cvat")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);

    let applied = runner.applied_migrations().await.unwrap();
    assert!(applied.contains(&CVAT_MIGRATION));
}

#[tokio::test]
async fn test_rerunning_after_rollback_keeps_template_current() {
    let pool = create_test_db().await;
    let registry = test_registry("example.com", &[("team-a", true)]);
    let runner = MigrationRunner::with_builtin_migrations(pool.clone(), Arc::new(registry));

    runner.apply(CVAT_MIGRATION).await.unwrap();
    assert_eq!(
        runner.rollback(CVAT_MIGRATION).await.unwrap(),
        RollbackOutcome::RolledBack
    );
    assert!(runner.applied_migrations().await.unwrap().is_empty());

    // Body runs again but the manifest is unchanged
    assert_eq!(runner.apply(CVAT_MIGRATION).await.unwrap(), ApplyOutcome::Applied);

    let versions = WorkspaceTemplateStore::new(pool)
        .list_workspace_template_versions("team-a", "cvat")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
}

#[tokio::test]
async fn test_rollback_of_unapplied_migration_is_noop() {
    let runner = MigrationRunner::with_builtin_migrations(
        create_test_db().await,
        Arc::new(NamespaceRegistry::default()),
    );

    assert_eq!(
        runner.rollback(CVAT_MIGRATION).await.unwrap(),
        RollbackOutcome::NotApplied
    );
}

#[tokio::test]
async fn test_unknown_migration_is_not_found() {
    let runner = MigrationRunner::with_builtin_migrations(
        create_test_db().await,
        Arc::new(NamespaceRegistry::default()),
    );

    assert!(matches!(
        runner.apply(1).await,
        Err(OrchestratorError::NotFound(_))
    ));
    assert!(matches!(
        runner.rollback(1).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_apply_pending_in_id_order() {
    let pool = create_test_db().await;
    let runs = Arc::new(AtomicUsize::new(0));
    let mut runner = MigrationRunner::new(pool, Arc::new(NamespaceRegistry::default()));

    runner
        .register(Box::new(CountingMigration {
            id: 30,
            runs: runs.clone(),
        }))
        .register(Box::new(CountingMigration {
            id: 10,
            runs: runs.clone(),
        }))
        // Duplicate id is ignored
        .register(Box::new(CountingMigration {
            id: 10,
            runs: runs.clone(),
        }));
    assert_eq!(runner.registered(), vec![10, 30]);

    runner.apply(10).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let newly_applied = runner.apply_pending().await.unwrap();
    assert_eq!(newly_applied, vec![30]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert!(runner.apply_pending().await.unwrap().is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_migration_leaves_no_trace() {
    let pool = create_test_db().await;
    let runner = MigrationRunner::with_builtin_migrations(pool.clone(), Arc::new(BrokenProvider));

    let err = runner
        .apply(CVAT_MIGRATION)
        .await
        .expect_err("Unreadable namespace config should abort the migration");
    match err {
        OrchestratorError::DataMigration { id, message } => {
            assert_eq!(id, CVAT_MIGRATION);
            assert!(message.contains("team-b"));
        }
        other => panic!("Expected DataMigration error, got {:?}", other),
    }

    assert!(runner.applied_migrations().await.unwrap().is_empty());

    // team-a was processed before the failure and must have been rolled back
    let template = WorkspaceTemplateStore::new(pool)
        .get_workspace_template("team-a", "cvat", None)
        .await
        .unwrap();
    assert!(template.is_none());
}
