//! Service layer wiring the audit engine around one database.
//!
//! `AuditService` owns `ChronDb` (raw database access) and the shared
//! `Arc<AuditConfiguration>`, and hands the same configuration to the
//! entity store, the change recorder, and the reader.
//!
//! Every flush follows this protocol:
//! 1. Begin transaction
//! 2. Allocate a revision if any change is tracked
//! 3. Write each primary row, then its audit row
//! 4. Commit (or roll back everything)

use std::sync::Arc;

use chron_config::ChronConfig;
use chron_core::configuration::AuditConfiguration;

use crate::ChronDb;
use crate::error::DatabaseError;
use crate::reader::AuditReader;
use crate::recorder::ChangeRecorder;
use crate::schema::SchemaChangeSet;
use crate::store::{EntityStore, FlushContext, FlushOutcome, UnitOfWork};

pub struct AuditService {
    db: ChronDb,
    config: Arc<AuditConfiguration>,
    store: EntityStore,
    recorder: ChangeRecorder,
    reader: AuditReader,
}

impl AuditService {
    /// Create a service over a local database.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    /// * `config` - The audit configuration, built once at startup.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(
        db_path: &str,
        config: Arc<AuditConfiguration>,
    ) -> Result<Self, DatabaseError> {
        let db = ChronDb::open_local(db_path, config.naming()).await?;
        Ok(Self::from_db(db, config))
    }

    /// Build the audit configuration from loaded settings and open the
    /// configured database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Config` if the configuration is invalid, or
    /// any error from [`Self::new_local`].
    pub async fn open(settings: &ChronConfig) -> Result<Self, DatabaseError> {
        let config = Arc::new(settings.audit_configuration()?);
        Self::new_local(&settings.database.path, config).await
    }

    /// Create from an existing `ChronDb`.
    #[must_use]
    pub fn from_db(db: ChronDb, config: Arc<AuditConfiguration>) -> Self {
        Self {
            store: EntityStore::new(&db, Arc::clone(&config)),
            recorder: ChangeRecorder::new(Arc::clone(&config)),
            reader: AuditReader::new(&db, Arc::clone(&config)),
            db,
            config,
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &ChronDb {
        &self.db
    }

    #[must_use]
    pub fn config(&self) -> &AuditConfiguration {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    #[must_use]
    pub const fn reader(&self) -> &AuditReader {
        &self.reader
    }

    /// Audit schema changes that [`Self::synchronize_schema`] would apply.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the live schema cannot be inspected or an
    /// audit table cannot be repaired additively.
    pub async fn plan_schema(&self) -> Result<SchemaChangeSet, DatabaseError> {
        self.db.plan_audit_schema(&self.config).await
    }

    /// Create or extend audit tables for every tracked type.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if planning or applying fails.
    pub async fn synchronize_schema(&self) -> Result<SchemaChangeSet, DatabaseError> {
        self.db.synchronize(&self.config).await
    }

    /// Create or extend the primary tables of every mapped type.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if planning or applying fails.
    pub async fn ensure_entity_tables(&self) -> Result<SchemaChangeSet, DatabaseError> {
        self.db.ensure_entity_tables(&self.config).await
    }

    #[must_use]
    pub fn unit_of_work(&self) -> UnitOfWork {
        self.store.unit_of_work()
    }

    /// Flush a unit of work with the change recorder attached.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` from any primary or audit write; nothing is
    /// persisted in that case.
    pub async fn flush(
        &self,
        uow: UnitOfWork,
        ctx: &FlushContext,
    ) -> Result<FlushOutcome, DatabaseError> {
        self.store.flush(uow, ctx, &self.recorder).await
    }
}
