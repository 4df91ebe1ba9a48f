//! Cross-cutting error types for Chronicle.
//!
//! Errors that can surface from any crate: mapping problems found while
//! building the audit configuration, and the expected "nothing there"
//! outcomes of audit queries. Storage errors live in `chron-db`, config
//! errors in `chron-config`; the CLI converges them through `anyhow`.

use thiserror::Error;

/// Errors that can be raised by any Chronicle crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tracked type's structure cannot be mirrored into an audit table.
    ///
    /// Fatal at configuration build time. The type is never partially tracked.
    #[error("Unsupported mapping for {entity_type}: {reason}")]
    UnsupportedMapping { entity_type: String, reason: String },

    /// The type name is not known to the audit configuration.
    #[error("Unknown entity type: {0}")]
    UnknownType(String),

    /// A revision, snapshot, or change history lookup found nothing.
    #[error("Not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// One side of a diff does not exist at the requested revision.
    #[error("No revision of {entity_type} {id} exists at revision {revision}")]
    RevisionNotFound {
        entity_type: String,
        id: String,
        revision: i64,
    },

    /// An identifier could not be converted into the type's key shape.
    #[error("Invalid key for {entity_type}: {reason}")]
    InvalidKey { entity_type: String, reason: String },

    /// Data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub(crate) fn unsupported(entity_type: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedMapping {
            entity_type: entity_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is an expected "nothing there" outcome.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::RevisionNotFound { .. })
    }
}
