//! Workspace lifecycle orchestration and workspace template data migrations
//!
//! This crate owns the persisted workspace and template records. Cluster side
//! effects are delegated to a [`WorkflowTrigger`] and per-namespace settings come
//! from a [`NamespaceConfigProvider`]. It is consumed by the ws-api HTTP service
//! but can also be used by CLI commands or background workers.

pub mod db;
pub mod error;
pub mod migration;
pub mod namespace;
pub mod pagination;
pub mod parameter;
pub mod template;
pub mod workflow;
pub mod workspace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{OrchestratorError, Result};
pub use migration::{ApplyOutcome, Migration, MigrationContext, MigrationRunner, RollbackOutcome};
pub use namespace::{
    ArtifactRepositoryConfig, Namespace, NamespaceConfig, NamespaceConfigProvider,
    NamespaceRegistry, SystemConfig,
};
pub use pagination::PaginationRequest;
pub use parameter::Parameter;
pub use template::{WorkspaceTemplate, WorkspaceTemplateStore};
pub use workflow::{
    QueuedWorkflowTrigger, WorkflowExecutionHandle, WorkflowExecutionRequest, WorkflowTrigger,
};
pub use workspace::{
    CreateWorkspaceRequest, Workspace, WorkspaceOrchestrator, WorkspacePhase,
    WorkspaceTemplateRef,
};
