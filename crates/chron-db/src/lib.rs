//! # chron-db
//!
//! libSQL persistence and query engine for Chronicle audit trails.
//!
//! - [`schema`]: derives audit table definitions and synchronizes them,
//!   additively, with the database.
//! - [`revision_log`]: allocates one revision per flush inside the flush's
//!   transaction.
//! - [`store`]: the unit-of-work entity store whose commit routine calls an
//!   injected [`store::FlushObserver`].
//! - [`recorder`]: the observer that writes audit rows.
//! - [`reader`]: revision history, snapshots as of a revision, and diffs.
//! - [`service`]: `AuditService`, wiring the above around one database.
//!
//! Uses the `libsql` crate (C `SQLite` fork) for local databases.

pub mod error;
pub mod helpers;
mod migrations;
pub mod reader;
pub mod recorder;
pub mod revision_log;
pub mod schema;
pub mod service;
pub mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use chron_core::naming::NamingPolicy;
use error::DatabaseError;
use libsql::Builder;
use tokio::sync::Mutex;

use crate::helpers::quote_ident;

/// Exclusive access to the shared connection.
///
/// `SQLite` transactions are per connection, so a flush or schema apply holds
/// the gate from `BEGIN` to `COMMIT`/`ROLLBACK` and readers hold it for each
/// query. Nothing else may run statements on the connection meanwhile.
pub type ConnGate = Arc<Mutex<()>>;

/// Central database handle.
///
/// Wraps a libSQL database and connection and guarantees the revision log
/// exists once opened.
pub struct ChronDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
    gate: ConnGate,
    revision_table: String,
}

impl ChronDb {
    /// Open a local database at the given path (`":memory:"` for tests).
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str, naming: &NamingPolicy) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let chron_db = Self {
            db,
            conn,
            gate: Arc::new(Mutex::new(())),
            revision_table: naming.revision_table.clone(),
        };
        chron_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(chron_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// The gate every component sharing [`Self::conn`] must hold.
    #[must_use]
    pub fn gate(&self) -> ConnGate {
        Arc::clone(&self.gate)
    }

    /// Whether a table with this name exists.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the catalog query fails.
    pub async fn table_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Column names of a table, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the pragma query fails.
    pub async fn table_columns(&self, name: &str) -> Result<Option<Vec<String>>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn
            .query(&format!("PRAGMA table_info({})", quote_ident(name)), ())
            .await?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next().await? {
            columns.push(row.get::<String>(1)?);
        }
        Ok(if columns.is_empty() { None } else { Some(columns) })
    }
}
