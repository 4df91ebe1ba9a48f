//! Revision log.
//!
//! One row per committed flush that touched at least one tracked entity.
//! Ids come from `AUTOINCREMENT`, so they are strictly increasing in commit
//! order and never reused.

use chrono::Utc;
use chron_core::naming::NamingPolicy;
use chron_core::revision::Revision;

use crate::error::DatabaseError;
use crate::helpers::{parse_datetime, quote_ident};

/// Allocate a new revision on `conn`.
///
/// Must run inside the flush's transaction: if the flush rolls back, the
/// revision row goes with it.
///
/// # Errors
///
/// Returns `DatabaseError` if the INSERT fails or returns no id.
pub async fn begin(
    conn: &libsql::Connection,
    naming: &NamingPolicy,
    username: Option<&str>,
) -> Result<Revision, DatabaseError> {
    let timestamp = Utc::now();
    let sql = format!(
        "INSERT INTO {} (timestamp, username) VALUES (?1, ?2) RETURNING id",
        quote_ident(&naming.revision_table)
    );
    let mut rows = conn
        .query(&sql, libsql::params![timestamp.to_rfc3339(), username])
        .await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    let id = row.get::<i64>(0)?;

    tracing::debug!(revision = id, username, "revision allocated");
    Ok(Revision {
        id,
        timestamp,
        username: username.map(ToString::to_string),
    })
}

/// Columns selected by [`row_to_revision`], in order.
pub(crate) const REVISION_COLUMNS: &str = "id, timestamp, username";

pub(crate) fn row_to_revision(row: &libsql::Row) -> Result<Revision, DatabaseError> {
    Ok(Revision {
        id: row.get::<i64>(0)?,
        timestamp: parse_datetime(&row.get::<String>(1)?)?,
        username: row.get::<Option<String>>(2)?,
    })
}
