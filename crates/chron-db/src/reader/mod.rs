//! Audit reader.
//!
//! Read-only queries over the revision log and the audit tables. Every
//! method takes a type name, a key as ordered scalars, and revision ids, and
//! returns plain data. Readers share nothing with writers except the
//! immutable audit configuration; each query holds the connection gate so
//! it never observes a flush between `BEGIN` and `COMMIT`.
//!
//! - [`revisions`]: revision history, single revisions, the revision index
//! - [`entities`]: snapshots as of a revision and per-entity history
//! - [`diff`]: field-level comparison of two snapshots

mod diff;
mod entities;
mod revisions;

pub use revisions::RevisionEntry;

use std::collections::BTreeMap;
use std::sync::Arc;

use chron_core::configuration::AuditConfiguration;
use chron_core::revision::RevisionType;
use chron_core::snapshot::EntitySnapshot;
use chron_core::tracked::TrackedType;
use chron_core::value::{FieldValue, format_key};

use crate::error::DatabaseError;
use crate::helpers::{get_field, param_index, quote_list};
use crate::{ChronDb, ConnGate};

pub struct AuditReader {
    conn: libsql::Connection,
    gate: ConnGate,
    config: Arc<AuditConfiguration>,
}

impl AuditReader {
    #[must_use]
    pub fn new(db: &ChronDb, config: Arc<AuditConfiguration>) -> Self {
        Self {
            conn: db.conn().clone(),
            gate: db.gate(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuditConfiguration {
        &self.config
    }

    /// Tracked type plus key arity check.
    fn tracked_with_key(
        &self,
        type_name: &str,
        key: &[FieldValue],
    ) -> Result<&Arc<TrackedType>, DatabaseError> {
        let tracked = self.config.tracked(type_name)?;
        tracked.check_key(key)?;
        Ok(tracked)
    }

    /// Column list for [`Self::row_to_snapshot`]: mirrored columns, then
    /// revision and revision type.
    fn snapshot_columns(&self, tracked: &TrackedType) -> String {
        let naming = self.config.naming();
        quote_list(
            tracked
                .mirrored()
                .map(|c| c.column.as_str())
                .chain([naming.revision_field.as_str(), naming.revision_type_field.as_str()]),
        )
    }

    fn row_to_snapshot(
        tracked: &TrackedType,
        row: &libsql::Row,
    ) -> Result<EntitySnapshot, DatabaseError> {
        let mut values = BTreeMap::new();
        for (i, column) in tracked.mirrored().enumerate() {
            values.insert(
                column.field.clone(),
                get_field(row, param_index(i)?, column.field_type)?,
            );
        }
        let idx = tracked.mirrored().count();
        let revision = row.get::<i64>(param_index(idx)?)?;
        let revision_type = row
            .get::<String>(param_index(idx + 1)?)?
            .parse::<RevisionType>()?;
        let key = tracked.key_of(&values).ok_or_else(|| {
            DatabaseError::InvalidState(format!(
                "audit row of {} at revision {revision} has a null key",
                tracked.name
            ))
        })?;
        Ok(EntitySnapshot {
            type_name: tracked.name.clone(),
            key,
            values,
            revision,
            revision_type,
        })
    }

    fn not_found(type_name: &str, key: &[FieldValue]) -> DatabaseError {
        DatabaseError::not_found(type_name, format_key(key))
    }
}
