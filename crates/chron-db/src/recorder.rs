//! Change recorder.
//!
//! The flush observer that turns primary writes into audit rows. It
//! allocates one revision per flush that touches at least one tracked
//! entity, then appends one audit row per tracked change, all on the
//! flush's transaction.

use std::sync::Arc;

use chron_core::configuration::AuditConfiguration;
use chron_core::revision::Revision;
use chron_core::value::{FieldValue, format_key};

use crate::error::DatabaseError;
use crate::helpers::{placeholders, quote_ident, quote_list, to_sql_value};
use crate::revision_log;
use crate::store::{FlushContext, FlushObserver, PendingChange};

pub struct ChangeRecorder {
    config: Arc<AuditConfiguration>,
}

impl ChangeRecorder {
    #[must_use]
    pub const fn new(config: Arc<AuditConfiguration>) -> Self {
        Self { config }
    }

    fn touches_tracked(&self, changes: &[PendingChange]) -> bool {
        changes.iter().any(|c| self.config.is_tracked(c.type_name()))
    }
}

impl FlushObserver for ChangeRecorder {
    async fn before_write(
        &self,
        conn: &libsql::Connection,
        changes: &[PendingChange],
        ctx: &FlushContext,
    ) -> Result<Option<Revision>, DatabaseError> {
        if !self.touches_tracked(changes) {
            return Ok(None);
        }
        let revision =
            revision_log::begin(conn, self.config.naming(), ctx.username.as_deref()).await?;
        tracing::info!(
            revision = revision.id,
            username = revision.username.as_deref(),
            changes = changes.len(),
            "recording revision"
        );
        Ok(Some(revision))
    }

    async fn on_entity_write(
        &self,
        conn: &libsql::Connection,
        revision: &Revision,
        change: &PendingChange,
    ) -> Result<(), DatabaseError> {
        if !self.config.is_tracked(change.type_name()) {
            return Ok(());
        }
        let tracked = self.config.tracked(change.type_name())?;
        let naming = self.config.naming();
        let values = &change.entity.values;
        let key = tracked.key_of(values).ok_or_else(|| {
            DatabaseError::InvalidState(format!(
                "{} written without a complete key",
                tracked.name
            ))
        })?;

        let mirrored: Vec<_> = tracked.mirrored().collect();
        let columns = mirrored
            .iter()
            .map(|c| c.column.as_str())
            .chain([naming.revision_field.as_str(), naming.revision_type_field.as_str()]);
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&tracked.audit_table),
            quote_list(columns),
            placeholders(mirrored.len() + 2)
        );

        let revision_type = change.kind.revision_type();
        let params: Vec<libsql::Value> = mirrored
            .iter()
            .map(|c| to_sql_value(values.get(&c.field).unwrap_or(&FieldValue::Null)))
            .chain([
                libsql::Value::Integer(revision.id),
                libsql::Value::Text(revision_type.as_str().to_string()),
            ])
            .collect();
        conn.execute(&sql, libsql::params_from_iter(params)).await?;

        tracing::debug!(
            revision = revision.id,
            entity_type = %tracked.name,
            id = %format_key(&key),
            revtype = %revision_type,
            "audit row written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chron_core::entity::Entity;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{ChangeKind, EntityStore};
    use crate::test_support::helpers::{test_configuration, test_db};

    async fn setup() -> (crate::ChronDb, EntityStore, ChangeRecorder) {
        let db = test_db().await;
        let config = test_configuration();
        db.ensure_entity_tables(&config).await.unwrap();
        db.synchronize(&config).await.unwrap();
        let store = EntityStore::new(&db, Arc::clone(&config));
        (db, store, ChangeRecorder::new(config))
    }

    async fn count(db: &crate::ChronDb, sql: &str) -> i64 {
        let mut rows = db.conn().query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get(0).unwrap()
    }

    #[tokio::test]
    async fn untracked_only_flush_allocates_no_revision() {
        let (db, store, recorder) = setup().await;
        let mut uow = store.unit_of_work();
        uow.insert(Entity::new("Session").with("token", "abc").with("user", "ana"))
            .unwrap();
        let outcome = store
            .flush(uow, &FlushContext::as_user("ana"), &recorder)
            .await
            .unwrap();
        assert!(outcome.revision.is_none());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM revisions").await, 0);
    }

    #[tokio::test]
    async fn one_row_per_tracked_change() {
        let (db, store, recorder) = setup().await;
        let mut uow = store.unit_of_work();
        uow.insert(Entity::new("Author").with("id", 1).with("name", "ana"))
            .unwrap();
        uow.insert(Entity::new("Article").with("title", "hello").with("author", 1))
            .unwrap();
        uow.insert(Entity::new("Session").with("token", "abc")).unwrap();

        let outcome = store
            .flush(uow, &FlushContext::as_user("ana"), &recorder)
            .await
            .unwrap();
        let revision = outcome.revision.unwrap();
        assert_eq!(revision.username.as_deref(), Some("ana"));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM revisions").await, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM authors_audit").await, 1);
        assert_eq!(
            count(
                &db,
                "SELECT COUNT(*) FROM articles_audit WHERE author_id = 1 AND revtype = 'INS'"
            )
            .await,
            1
        );
        assert_eq!(outcome.changes[1].kind, ChangeKind::Insert);
    }

    #[tokio::test]
    async fn failing_audit_write_rolls_back_primary_write() {
        let (db, store, recorder) = setup().await;
        db.conn().execute_batch("DROP TABLE authors_audit").await.unwrap();

        let mut uow = store.unit_of_work();
        uow.insert(Entity::new("Author").with("id", 1).with("name", "ana"))
            .unwrap();
        assert!(
            store
                .flush(uow, &FlushContext::anonymous(), &recorder)
                .await
                .is_err()
        );
        assert_eq!(count(&db, "SELECT COUNT(*) FROM authors").await, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM revisions").await, 0);
    }
}
