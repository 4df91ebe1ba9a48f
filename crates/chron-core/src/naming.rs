//! Table and column naming policy for audit storage.

use serde::{Deserialize, Serialize};

/// Names used for the revision table, audit tables, and the two audit-only
/// columns. Built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    pub table_prefix: String,
    pub table_suffix: String,
    pub revision_table: String,
    pub revision_field: String,
    pub revision_type_field: String,
    /// Columns never mirrored into audit tables (e.g. `updated_at`).
    pub ignore_columns: Vec<String>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            table_suffix: "_audit".into(),
            revision_table: "revisions".into(),
            revision_field: "rev".into(),
            revision_type_field: "revtype".into(),
            ignore_columns: Vec::new(),
        }
    }
}

impl NamingPolicy {
    /// Audit table name for a primary table.
    #[must_use]
    pub fn audit_table(&self, table: &str) -> String {
        format!("{}{table}{}", self.table_prefix, self.table_suffix)
    }

    #[must_use]
    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignore_columns.iter().any(|c| c == column)
    }

    /// Whether a mirrored column would shadow one of the audit-only columns.
    #[must_use]
    pub fn is_reserved(&self, column: &str) -> bool {
        column == self.revision_field || column == self.revision_type_field
    }
}
