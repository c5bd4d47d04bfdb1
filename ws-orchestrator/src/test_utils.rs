use crate::namespace::{ArtifactRepositoryConfig, GcsConfig, NamespaceConfig, NamespaceRegistry};
use crate::workflow::{WorkflowExecutionHandle, WorkflowExecutionRequest, WorkflowTrigger};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Registry serving `domain` with one namespace per entry; `true` marks a GCS backed namespace.
pub fn test_registry(domain: &str, namespaces: &[(&str, bool)]) -> NamespaceRegistry {
    let mut registry = NamespaceRegistry::with_domain(domain);
    for (name, gcs) in namespaces {
        let artifact_repository = ArtifactRepositoryConfig {
            s3: None,
            gcs: gcs.then(GcsConfig::default),
        };
        registry.insert(
            name,
            true,
            NamespaceConfig {
                domain: Some(domain.to_string()),
                artifact_repository,
            },
        );
    }
    registry
}

/// Workflow trigger that records every request instead of executing it.
#[derive(Clone, Default)]
pub struct RecordingWorkflowTrigger {
    executions: Arc<Mutex<Vec<(String, WorkflowExecutionRequest)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingWorkflowTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent executions fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Recorded `(namespace, request)` pairs, oldest first.
    pub fn executions(&self) -> Vec<(String, WorkflowExecutionRequest)> {
        self.executions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_execution(&self) -> Option<(String, WorkflowExecutionRequest)> {
        self.executions().pop()
    }
}

#[async_trait]
impl WorkflowTrigger for RecordingWorkflowTrigger {
    async fn execute(
        &self,
        namespace: &str,
        request: &WorkflowExecutionRequest,
    ) -> anyhow::Result<WorkflowExecutionHandle> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("workflow engine unavailable");
        }

        let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
        executions.push((namespace.to_string(), request.clone()));

        Ok(WorkflowExecutionHandle {
            name: format!("execution-{}", executions.len()),
        })
    }
}
