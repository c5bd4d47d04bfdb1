use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use ws_api::{create_app, AppState, Config};
use ws_logging::{init_subscriber, LogSettings};
use ws_orchestrator::db::{backup_database, create_pool, run_migrations};
use ws_orchestrator::{
    MigrationRunner, NamespaceRegistry, QueuedWorkflowTrigger, WorkspaceOrchestrator,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_subscriber(&LogSettings::from_env());

    info!("Starting ws-api service...");

    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, namespaces={}",
        config.bind_addr,
        config.db_path.display(),
        config.namespaces_path.display()
    );

    let namespaces = NamespaceRegistry::load(&config.namespaces_path).with_context(|| {
        format!(
            "loading namespace configuration from {}",
            config.namespaces_path.display()
        )
    })?;
    let namespaces = Arc::new(namespaces);

    // Backup before migrations
    let db_path = &config.db_path;
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;

    let runner = MigrationRunner::with_builtin_migrations(pool.clone(), namespaces.clone());
    let applied = runner.apply_pending().await?;
    info!("Migrations complete ({} data migrations applied)", applied.len());

    let orchestrator = WorkspaceOrchestrator::new(
        pool.clone(),
        namespaces,
        Arc::new(QueuedWorkflowTrigger::new(pool)),
    );
    let app = create_app(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
