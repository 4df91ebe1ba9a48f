//! Database migration runner.
//!
//! The only table the engine owns unconditionally is the revision log. Its
//! name comes from the naming policy, so the DDL is rendered at open time
//! rather than embedded. All statements use `IF NOT EXISTS` for idempotent
//! re-running. Audit tables are handled by the schema synchronizer.

use crate::ChronDb;
use crate::error::DatabaseError;
use crate::helpers::quote_ident;

impl ChronDb {
    /// Run all migrations in sequence.
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        // AUTOINCREMENT: ids are never reused, even after the highest row is gone.
        let revision_log = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                username TEXT
            )",
            quote_ident(&self.revision_table)
        );
        self.conn
            .execute_batch(&revision_log)
            .await
            .map_err(|e| DatabaseError::Migration(format!("revision log: {e}")))?;
        Ok(())
    }
}
