//! Database error types for chron-db.

use chron_config::ConfigError;
use chron_core::errors::CoreError;
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Domain error: unknown type, not found, unsupported mapping.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration could not be turned into an audit configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DatabaseError {
    /// Whether this is an expected "nothing there" outcome rather than a failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Core(core) => core.is_not_found(),
            Self::NoResult => true,
            _ => false,
        }
    }

    pub(crate) fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        Self::Core(CoreError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        })
    }
}
