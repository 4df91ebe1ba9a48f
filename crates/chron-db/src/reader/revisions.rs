use chron_core::revision::{Page, Revision};
use chron_core::snapshot::ChangedEntity;
use serde::Serialize;

use super::AuditReader;
use crate::error::DatabaseError;
use crate::helpers::{key_predicate, quote_ident};
use crate::revision_log::{REVISION_COLUMNS, row_to_revision};

/// A revision with everything it changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionEntry {
    pub revision: Revision,
    pub changes: Vec<ChangedEntity>,
}

impl AuditReader {
    /// Committed revisions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn find_revision_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Revision>, DatabaseError> {
        let sql = format!(
            "SELECT {REVISION_COLUMNS} FROM {} ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            quote_ident(&self.config.naming().revision_table)
        );
        let _gate = self.gate.lock().await;
        let mut rows = self.conn.query(&sql, libsql::params![limit, offset]).await?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next().await? {
            revisions.push(row_to_revision(&row)?);
        }
        Ok(revisions)
    }

    /// # Errors
    ///
    /// Returns a not-found `DatabaseError` if no such revision was committed.
    pub async fn find_revision(&self, id: i64) -> Result<Revision, DatabaseError> {
        let sql = format!(
            "SELECT {REVISION_COLUMNS} FROM {} WHERE {}",
            quote_ident(&self.config.naming().revision_table),
            key_predicate(["id"], 1)
        );
        let _gate = self.gate.lock().await;
        let mut rows = self.conn.query(&sql, [id]).await?;
        match rows.next().await? {
            Some(row) => row_to_revision(&row),
            None => Err(DatabaseError::not_found("Revision", id.to_string())),
        }
    }

    /// One page of the revision history, each revision paired with the
    /// entities it changed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if any query fails.
    pub async fn revision_index(&self, page: Page) -> Result<Vec<RevisionEntry>, DatabaseError> {
        let revisions = self.find_revision_history(page.limit(), page.offset()).await?;
        let mut entries = Vec::with_capacity(revisions.len());
        for revision in revisions {
            let changes = self.find_entities_changed_at_revision(revision.id).await?;
            entries.push(RevisionEntry { revision, changes });
        }
        Ok(entries)
    }
}
