//! Unit-of-work entity store.
//!
//! Callers register inserts, updates, and deletes on a [`UnitOfWork`] and
//! hand it to [`EntityStore::flush`], which writes every change to the
//! primary tables inside one transaction. The flush routine exposes two
//! hook points through [`FlushObserver`]:
//!
//! 1. `before_write` runs once, before any primary row is written, with the
//!    full change set. It may allocate a revision.
//! 2. `on_entity_write` runs after each primary row write, with the
//!    entity's post-write state (generated keys filled in). For deletes it
//!    receives the last known state.
//!
//! Observer errors abort the flush and roll back everything written so far,
//! primary rows included.

use std::collections::HashMap;
use std::sync::Arc;

use chron_core::configuration::AuditConfiguration;
use chron_core::entity::Entity;
use chron_core::errors::CoreError;
use chron_core::mapping::EntityMapping;
use chron_core::revision::{Revision, RevisionType};
use chron_core::value::{FieldValue, format_key};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::helpers::{
    get_field, key_predicate, param_index, placeholders, quote_ident, quote_list, to_sql_value,
};
use crate::{ChronDb, ConnGate};

/// Kind of a registered change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn revision_type(self) -> RevisionType {
        match self {
            Self::Insert => RevisionType::Insert,
            Self::Update => RevisionType::Update,
            Self::Delete => RevisionType::Delete,
        }
    }
}

/// One entity change waiting for (or just past) its primary write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub entity: Entity,
}

impl PendingChange {
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.entity.type_name
    }
}

/// Changes registered for one flush.
///
/// Registering the same entity twice collapses both registrations into the
/// single change the flush should perform. Entities are identified by type
/// and key; an insert without a key (database-generated) is always a new
/// entity.
#[derive(Debug)]
pub struct UnitOfWork {
    config: Arc<AuditConfiguration>,
    slots: Vec<Option<PendingChange>>,
    by_identity: HashMap<String, usize>,
}

impl UnitOfWork {
    #[must_use]
    pub fn new(config: Arc<AuditConfiguration>) -> Self {
        Self {
            config,
            slots: Vec::new(),
            by_identity: HashMap::new(),
        }
    }

    /// Register a new entity.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the type is unknown, a field is not
    /// mapped, an assigned key is missing, or the entity is already
    /// registered as inserted or updated.
    pub fn insert(&mut self, entity: Entity) -> Result<(), DatabaseError> {
        self.register(ChangeKind::Insert, entity)
    }

    /// Register changed fields of an existing entity. Only the fields
    /// present on `entity` are written.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the type is unknown, a field is not
    /// mapped, the key is missing, or the entity is already registered for
    /// deletion.
    pub fn update(&mut self, entity: Entity) -> Result<(), DatabaseError> {
        self.register(ChangeKind::Update, entity)
    }

    /// Register an entity for deletion. Only its key is required.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the type is unknown or the key is missing.
    pub fn delete(&mut self, entity: Entity) -> Result<(), DatabaseError> {
        self.register(ChangeKind::Delete, entity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Registered changes in registration order.
    pub fn changes(&self) -> impl Iterator<Item = &PendingChange> {
        self.slots.iter().flatten()
    }

    fn into_changes(self) -> Vec<PendingChange> {
        self.slots.into_iter().flatten().collect()
    }

    fn register(&mut self, kind: ChangeKind, entity: Entity) -> Result<(), DatabaseError> {
        let mapping = self
            .config
            .mapping(&entity.type_name)
            .ok_or_else(|| CoreError::UnknownType(entity.type_name.clone()))?;
        check_fields(mapping, &entity)?;

        let identity = match mapping_key(mapping, &entity) {
            Some(key) => format!("{}#{}", entity.type_name, format_key(&key)),
            None if kind == ChangeKind::Insert && mapping.has_generated_id() => {
                self.slots.push(Some(PendingChange { kind, entity }));
                return Ok(());
            }
            None => {
                return Err(CoreError::InvalidKey {
                    entity_type: entity.type_name.clone(),
                    reason: format!("{kind:?} requires every identifier field"),
                }
                .into());
            }
        };

        let Some(&slot) = self.by_identity.get(&identity) else {
            self.by_identity.insert(identity, self.slots.len());
            self.slots.push(Some(PendingChange { kind, entity }));
            return Ok(());
        };
        let Some(earlier) = self.slots[slot].take() else {
            self.slots[slot] = Some(PendingChange { kind, entity });
            return Ok(());
        };

        let merged = match (earlier.kind, kind) {
            (ChangeKind::Insert | ChangeKind::Update, ChangeKind::Update) => {
                let mut merged = earlier;
                merged.entity.merge(entity);
                Some(merged)
            }
            (ChangeKind::Insert, ChangeKind::Delete) => None,
            (ChangeKind::Update, ChangeKind::Delete) => Some(PendingChange { kind, entity }),
            (ChangeKind::Delete, ChangeKind::Insert) => Some(PendingChange {
                kind: ChangeKind::Update,
                entity: replacement(mapping, entity),
            }),
            (ChangeKind::Delete, ChangeKind::Delete) => Some(earlier),
            (earlier_kind, _) => {
                let conflict = format!(
                    "{identity} is already registered as {earlier_kind:?}, cannot register {kind:?}"
                );
                self.slots[slot] = Some(earlier);
                return Err(CoreError::Validation(conflict).into());
            }
        };
        if merged.is_none() {
            self.by_identity.remove(&identity);
        }
        self.slots[slot] = merged;
        Ok(())
    }
}

fn check_fields(mapping: &EntityMapping, entity: &Entity) -> Result<(), CoreError> {
    let stored = mapping.stored_columns();
    for field in entity.values.keys() {
        if !stored.iter().any(|(name, _, _)| name == field) {
            return Err(CoreError::Validation(format!(
                "{} has no stored field '{field}'",
                mapping.name
            )));
        }
    }
    Ok(())
}

/// A reinsert over a deleted row replaces it whole: stored fields the
/// insert leaves out become null instead of keeping the deleted values.
fn replacement(mapping: &EntityMapping, mut entity: Entity) -> Entity {
    for (field, _, _) in mapping.stored_columns() {
        entity.values.entry(field).or_insert(FieldValue::Null);
    }
    entity
}

/// Key of an entity from its identifier fields, if all are set.
fn mapping_key(mapping: &EntityMapping, entity: &Entity) -> Option<Vec<FieldValue>> {
    mapping
        .id_fields()
        .map(|f| entity.get(&f.name).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// Who is flushing. Recorded on the revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushContext {
    pub username: Option<String>,
}

impl FlushContext {
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { username: None }
    }

    #[must_use]
    pub fn as_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }
}

/// Result of a committed flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushOutcome {
    /// The revision allocated by the observer, if any.
    pub revision: Option<Revision>,
    /// Changes as written, with post-write entity state.
    pub changes: Vec<PendingChange>,
}

/// Hook points of the flush routine.
///
/// Both methods run on the flush's transaction; returning an error aborts
/// the flush.
#[allow(async_fn_in_trait)]
pub trait FlushObserver {
    /// Called once before any primary row is written.
    async fn before_write(
        &self,
        conn: &libsql::Connection,
        changes: &[PendingChange],
        ctx: &FlushContext,
    ) -> Result<Option<Revision>, DatabaseError>;

    /// Called after each primary row write when `before_write` returned a
    /// revision.
    async fn on_entity_write(
        &self,
        conn: &libsql::Connection,
        revision: &Revision,
        change: &PendingChange,
    ) -> Result<(), DatabaseError>;
}

/// Observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FlushObserver for NoopObserver {
    async fn before_write(
        &self,
        _conn: &libsql::Connection,
        _changes: &[PendingChange],
        _ctx: &FlushContext,
    ) -> Result<Option<Revision>, DatabaseError> {
        Ok(None)
    }

    async fn on_entity_write(
        &self,
        _conn: &libsql::Connection,
        _revision: &Revision,
        _change: &PendingChange,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Primary-table persistence for mapped entity types.
///
/// Flushes are serialized on the database's [`ConnGate`]: each one owns the
/// connection from `BEGIN` to `COMMIT`, so concurrent callers queue instead
/// of nesting transactions.
pub struct EntityStore {
    conn: libsql::Connection,
    gate: ConnGate,
    config: Arc<AuditConfiguration>,
}

impl EntityStore {
    #[must_use]
    pub fn new(db: &ChronDb, config: Arc<AuditConfiguration>) -> Self {
        Self {
            conn: db.conn().clone(),
            gate: db.gate(),
            config,
        }
    }

    /// Start an empty unit of work bound to this store's configuration.
    #[must_use]
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.config))
    }

    /// Load the current row of an entity.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the type is unknown, the key has the wrong
    /// arity, or the query fails.
    pub async fn load(
        &self,
        type_name: &str,
        key: &[FieldValue],
    ) -> Result<Option<Entity>, DatabaseError> {
        let mapping = self
            .config
            .mapping(type_name)
            .ok_or_else(|| CoreError::UnknownType(type_name.to_string()))?;
        if mapping.id_fields().count() != key.len() {
            return Err(CoreError::InvalidKey {
                entity_type: type_name.to_string(),
                reason: format!(
                    "expected {} key component(s), got {}",
                    mapping.id_fields().count(),
                    key.len()
                ),
            }
            .into());
        }
        let _gate = self.gate.lock().await;
        load_row(&self.conn, mapping, key).await
    }

    /// Write every registered change in one transaction, calling `observer`
    /// at the hook points.
    ///
    /// An empty unit of work is a no-op: no transaction, no observer calls.
    ///
    /// # Errors
    ///
    /// Returns the first error from a primary write or the observer. The
    /// transaction is rolled back and nothing is persisted.
    pub async fn flush<O: FlushObserver>(
        &self,
        uow: UnitOfWork,
        ctx: &FlushContext,
        observer: &O,
    ) -> Result<FlushOutcome, DatabaseError> {
        let changes = uow.into_changes();
        if changes.is_empty() {
            return Ok(FlushOutcome {
                revision: None,
                changes,
            });
        }

        let _gate = self.gate.lock().await;
        let tx = self.conn.transaction().await?;
        match self.write_all(&tx, changes, ctx, observer).await {
            Ok(outcome) => {
                tx.commit().await?;
                tracing::debug!(
                    changes = outcome.changes.len(),
                    revision = outcome.revision.as_ref().map(|r| r.id),
                    "flush committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "flush rollback failed");
                }
                tracing::debug!(error = %e, "flush aborted");
                Err(e)
            }
        }
    }

    async fn write_all<O: FlushObserver>(
        &self,
        conn: &libsql::Connection,
        changes: Vec<PendingChange>,
        ctx: &FlushContext,
        observer: &O,
    ) -> Result<FlushOutcome, DatabaseError> {
        let revision = observer.before_write(conn, &changes, ctx).await?;
        let mut written = Vec::with_capacity(changes.len());

        for change in changes {
            let mapping = self
                .config
                .mapping(change.type_name())
                .ok_or_else(|| CoreError::UnknownType(change.type_name().to_string()))?;
            let entity = match change.kind {
                ChangeKind::Insert => insert_row(conn, mapping, &change.entity).await?,
                ChangeKind::Update => update_row(conn, mapping, &change.entity).await?,
                ChangeKind::Delete => delete_row(conn, mapping, &change.entity).await?,
            };
            let change = PendingChange {
                kind: change.kind,
                entity,
            };
            if let Some(revision) = &revision {
                observer.on_entity_write(conn, revision, &change).await?;
            }
            written.push(change);
        }

        Ok(FlushOutcome {
            revision,
            changes: written,
        })
    }
}

fn missing_key(mapping: &EntityMapping) -> DatabaseError {
    CoreError::InvalidKey {
        entity_type: mapping.name.clone(),
        reason: "every identifier field must be set".into(),
    }
    .into()
}

async fn load_row(
    conn: &libsql::Connection,
    mapping: &EntityMapping,
    key: &[FieldValue],
) -> Result<Option<Entity>, DatabaseError> {
    let columns = mapping.stored_columns();
    let id_columns: Vec<&str> = mapping.id_fields().map(|f| f.column()).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        quote_list(columns.iter().map(|(_, c, _)| c.as_str())),
        quote_ident(&mapping.table),
        key_predicate(id_columns, 1)
    );
    let params: Vec<libsql::Value> = key.iter().map(to_sql_value).collect();
    let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };

    let mut entity = Entity::new(&mapping.name);
    for (i, (field, _, field_type)) in columns.iter().enumerate() {
        entity.set(field.as_str(), get_field(&row, param_index(i)?, *field_type)?);
    }
    Ok(Some(entity))
}

async fn insert_row(
    conn: &libsql::Connection,
    mapping: &EntityMapping,
    entity: &Entity,
) -> Result<Entity, DatabaseError> {
    let present: Vec<(String, &FieldValue)> = mapping
        .stored_columns()
        .into_iter()
        .filter_map(|(field, column, _)| {
            let value = entity.get(&field)?;
            let generated_gap = value.is_null()
                && mapping.has_generated_id()
                && mapping.id_fields().any(|f| f.name == field);
            (!generated_gap).then_some((column, value))
        })
        .collect();

    let ids: Vec<_> = mapping.id_fields().collect();
    let returning = quote_list(ids.iter().map(|f| f.column()));
    let sql = if present.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {returning}",
            quote_ident(&mapping.table)
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {returning}",
            quote_ident(&mapping.table),
            quote_list(present.iter().map(|(c, _)| c.as_str())),
            placeholders(present.len())
        )
    };
    let params: Vec<libsql::Value> = present.iter().map(|(_, v)| to_sql_value(v)).collect();
    let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
    let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
    let key = ids
        .iter()
        .enumerate()
        .map(|(i, f)| get_field(&row, param_index(i)?, f.field_type))
        .collect::<Result<Vec<_>, _>>()?;
    drop(rows);

    load_row(conn, mapping, &key)
        .await?
        .ok_or(DatabaseError::NoResult)
}

async fn update_row(
    conn: &libsql::Connection,
    mapping: &EntityMapping,
    entity: &Entity,
) -> Result<Entity, DatabaseError> {
    let key = mapping_key(mapping, entity).ok_or_else(|| missing_key(mapping))?;
    let assignments: Vec<(String, &FieldValue)> = mapping
        .stored_columns()
        .into_iter()
        .filter(|(field, _, _)| !mapping.id_fields().any(|f| &f.name == field))
        .filter_map(|(field, column, _)| entity.get(&field).map(|v| (column, v)))
        .collect();

    if !assignments.is_empty() {
        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {set_clause} WHERE {}",
            quote_ident(&mapping.table),
            key_predicate(mapping.id_fields().map(|f| f.column()), assignments.len() + 1)
        );
        let params: Vec<libsql::Value> = assignments
            .iter()
            .map(|(_, v)| to_sql_value(v))
            .chain(key.iter().map(to_sql_value))
            .collect();
        let affected = conn.execute(&sql, libsql::params_from_iter(params)).await?;
        if affected == 0 {
            return Err(DatabaseError::not_found(&mapping.name, format_key(&key)));
        }
    }

    load_row(conn, mapping, &key)
        .await?
        .ok_or_else(|| DatabaseError::not_found(&mapping.name, format_key(&key)))
}

async fn delete_row(
    conn: &libsql::Connection,
    mapping: &EntityMapping,
    entity: &Entity,
) -> Result<Entity, DatabaseError> {
    let key = mapping_key(mapping, entity).ok_or_else(|| missing_key(mapping))?;
    let last_known = load_row(conn, mapping, &key)
        .await?
        .ok_or_else(|| DatabaseError::not_found(&mapping.name, format_key(&key)))?;

    let sql = format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(&mapping.table),
        key_predicate(mapping.id_fields().map(|f| f.column()), 1)
    );
    let params: Vec<libsql::Value> = key.iter().map(to_sql_value).collect();
    conn.execute(&sql, libsql::params_from_iter(params)).await?;
    Ok(last_known)
}
