use thiserror::Error;
use ws_core::CoreError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error while {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Data migration {id} failed: {message}")]
    DataMigration { id: i64, message: String },

    #[error("Workflow error while {context}: {source:#}")]
    Workflow {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Whether the message is safe to hand back to an API caller unchanged.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NotFound(_)
                | OrchestratorError::AlreadyExists(_)
                | OrchestratorError::InvalidArgument(_)
                | OrchestratorError::Core(_)
        )
    }
}

/// Attach operation context to persistence failures.
pub(crate) trait StoreContext<T> {
    fn store_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, sqlx::Error> {
    fn store_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| OrchestratorError::Store {
            context: context(),
            source,
        })
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
