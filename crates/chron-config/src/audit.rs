//! Audit naming and tracking configuration.

use chron_core::naming::NamingPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_table_suffix() -> String {
    "_audit".into()
}

fn default_revision_table() -> String {
    "revisions".into()
}

fn default_revision_field() -> String {
    "rev".into()
}

fn default_revision_type_field() -> String {
    "revtype".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Names of the entity types whose changes are recorded.
    #[serde(default)]
    pub tracked: Vec<String>,

    #[serde(default)]
    pub table_prefix: String,

    #[serde(default = "default_table_suffix")]
    pub table_suffix: String,

    #[serde(default = "default_revision_table")]
    pub revision_table: String,

    #[serde(default = "default_revision_field")]
    pub revision_field: String,

    #[serde(default = "default_revision_type_field")]
    pub revision_type_field: String,

    /// Columns never copied into audit tables.
    #[serde(default)]
    pub ignore_columns: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tracked: Vec::new(),
            table_prefix: String::new(),
            table_suffix: default_table_suffix(),
            revision_table: default_revision_table(),
            revision_field: default_revision_field(),
            revision_type_field: default_revision_type_field(),
            ignore_columns: Vec::new(),
        }
    }
}

impl AuditConfig {
    /// Check that every generated name is a plain SQL identifier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.is_empty() && self.table_suffix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "audit.table_suffix".into(),
                reason: "prefix and suffix cannot both be empty".into(),
            });
        }
        let names = [
            ("audit.table_prefix", &self.table_prefix, true),
            ("audit.table_suffix", &self.table_suffix, true),
            ("audit.revision_table", &self.revision_table, false),
            ("audit.revision_field", &self.revision_field, false),
            ("audit.revision_type_field", &self.revision_type_field, false),
        ];
        for (field, value, may_be_empty) in names {
            if value.is_empty() && !may_be_empty {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "must not be empty".into(),
                });
            }
            if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: format!("'{value}' is not a plain identifier"),
                });
            }
        }
        if self.revision_field == self.revision_type_field {
            return Err(ConfigError::InvalidValue {
                field: "audit.revision_type_field".into(),
                reason: "must differ from audit.revision_field".into(),
            });
        }
        Ok(())
    }

    /// Naming policy handed to the metadata resolver.
    #[must_use]
    pub fn naming(&self) -> NamingPolicy {
        NamingPolicy {
            table_prefix: self.table_prefix.clone(),
            table_suffix: self.table_suffix.clone(),
            revision_table: self.revision_table.clone(),
            revision_field: self.revision_field.clone(),
            revision_type_field: self.revision_type_field.clone(),
            ignore_columns: self.ignore_columns.clone(),
        }
    }
}
