use std::collections::HashMap;

use chron_core::revision::{Revision, RevisionType};
use chron_core::snapshot::{ChangedEntity, EntitySnapshot};
use chron_core::value::FieldValue;

use super::AuditReader;
use crate::error::DatabaseError;
use crate::helpers::{key_predicate, quote_ident, to_sql_value};
use crate::revision_log::row_to_revision;

impl AuditReader {
    /// State of an entity as of `revision`: the most recent audit row at or
    /// before it.
    ///
    /// # Errors
    ///
    /// Returns a not-found `DatabaseError` if the entity did not exist yet
    /// or had been deleted at that revision.
    pub async fn find(
        &self,
        type_name: &str,
        key: &[FieldValue],
        revision: i64,
    ) -> Result<EntitySnapshot, DatabaseError> {
        let tracked = self.tracked_with_key(type_name, key)?;
        let naming = self.config.naming();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} AND {} <= ?{} ORDER BY {} DESC LIMIT 1",
            self.snapshot_columns(tracked),
            quote_ident(&tracked.audit_table),
            key_predicate(tracked.key_fields.iter().map(|k| k.column.as_str()), 1),
            quote_ident(&naming.revision_field),
            key.len() + 1,
            quote_ident(&naming.revision_field),
        );
        let params: Vec<libsql::Value> = key
            .iter()
            .map(to_sql_value)
            .chain([libsql::Value::Integer(revision)])
            .collect();

        let _gate = self.gate.lock().await;
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(params)).await?;
        let Some(row) = rows.next().await? else {
            return Err(Self::not_found(type_name, key));
        };
        let snapshot = Self::row_to_snapshot(tracked, &row)?;
        if snapshot.revision_type == RevisionType::Delete {
            return Err(Self::not_found(type_name, key));
        }
        Ok(snapshot)
    }

    /// Every revision that touched an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a not-found `DatabaseError` if the entity has no audit rows.
    pub async fn find_revisions(
        &self,
        type_name: &str,
        key: &[FieldValue],
    ) -> Result<Vec<Revision>, DatabaseError> {
        let tracked = self.tracked_with_key(type_name, key)?;
        let naming = self.config.naming();
        let sql = format!(
            "SELECT id, timestamp, username FROM {} WHERE id IN (SELECT {} FROM {} WHERE {}) ORDER BY id ASC",
            quote_ident(&naming.revision_table),
            quote_ident(&naming.revision_field),
            quote_ident(&tracked.audit_table),
            key_predicate(tracked.key_fields.iter().map(|k| k.column.as_str()), 1),
        );
        let params: Vec<libsql::Value> = key.iter().map(to_sql_value).collect();

        let _gate = self.gate.lock().await;
        let mut rows = self.conn.query(&sql, libsql::params_from_iter(params)).await?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next().await? {
            revisions.push(row_to_revision(&row)?);
        }
        if revisions.is_empty() {
            return Err(Self::not_found(type_name, key));
        }
        Ok(revisions)
    }

    /// Entities touched by one revision, tracked types in configuration
    /// order. Empty when the revision touched nothing or does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn find_entities_changed_at_revision(
        &self,
        revision: i64,
    ) -> Result<Vec<ChangedEntity>, DatabaseError> {
        let naming = self.config.naming();
        let mut changed = Vec::new();
        let _gate = self.gate.lock().await;
        for tracked in self.config.tracked_types() {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                self.snapshot_columns(tracked),
                quote_ident(&tracked.audit_table),
                quote_ident(&naming.revision_field),
            );
            let mut rows = self.conn.query(&sql, [revision]).await?;
            while let Some(row) = rows.next().await? {
                let snapshot = Self::row_to_snapshot(tracked, &row)?;
                changed.push(ChangedEntity {
                    type_name: snapshot.type_name.clone(),
                    key: snapshot.key.clone(),
                    revision_type: snapshot.revision_type,
                    snapshot,
                });
            }
        }
        Ok(changed)
    }

    /// Flatten a snapshot into field name -> value pairs. To-one relations
    /// appear as the target's key value.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the type is not tracked.
    pub fn entity_values(
        &self,
        type_name: &str,
        snapshot: &EntitySnapshot,
    ) -> Result<HashMap<String, FieldValue>, DatabaseError> {
        let tracked = self.config.tracked(type_name)?;
        Ok(tracked.entity_values(&snapshot.values))
    }
}
