//! Schema synchronizer.
//!
//! Derives the target table definition of every audit table from the
//! tracked types and compares it with what the database holds. The
//! resulting change set is additive only: create missing tables, add
//! missing columns. Nothing is dropped or altered in place, so running the
//! synchronizer twice plans nothing the second time.
//!
//! The same machinery provisions the entity store's primary tables.

use std::fmt;

use chron_core::configuration::AuditConfiguration;
use chron_core::mapping::EntityMapping;
use chron_core::naming::NamingPolicy;
use chron_core::revision::RevisionType;
use chron_core::tracked::TrackedType;
use chron_core::value::FieldType;
use serde::Serialize;

use crate::ChronDb;
use crate::error::DatabaseError;
use crate::helpers::{quote_ident, quote_list};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: &'static str,
    pub nullable: bool,
}

impl ColumnDef {
    fn new(name: &str, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            sql_type: field_type.storage_type(),
            nullable,
        }
    }

    fn render(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub table: String,
    pub references: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// Target definition of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    /// Single integer key assigned by `AUTOINCREMENT`.
    pub autoincrement: bool,
    pub checks: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexDef>,
    /// Columns that must already exist on a pre-existing table because they
    /// cannot be added as `NOT NULL` after the fact.
    #[serde(skip)]
    pub required: Vec<String>,
}

impl TableDef {
    fn create_statements(&self) -> Vec<String> {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                if self.autoincrement && self.primary_key.first() == Some(&col.name) {
                    format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&col.name))
                } else {
                    col.render()
                }
            })
            .collect();
        if !self.autoincrement && !self.primary_key.is_empty() {
            parts.push(format!(
                "PRIMARY KEY ({})",
                quote_list(self.primary_key.iter().map(String::as_str))
            ));
        }
        for fk in &self.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&fk.column),
                quote_ident(&fk.table),
                quote_ident(&fk.references)
            ));
        }
        for check in &self.checks {
            parts.push(format!("CHECK ({check})"));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name),
            parts.join(",\n    ")
        )];
        for index in &self.indexes {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index.name),
                quote_ident(&self.name),
                quote_list(index.columns.iter().map(String::as_str))
            ));
        }
        statements
    }
}

/// One additive schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    CreateTable { table: TableDef },
    AddColumn { table: String, column: ColumnDef },
}

impl SchemaChange {
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table } => &table.name,
            Self::AddColumn { table, .. } => table,
        }
    }

    /// SQL statements implementing this change.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        match self {
            Self::CreateTable { table } => table.create_statements(),
            Self::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column.render()
            )],
        }
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table } => write!(f, "create table {}", table.name),
            Self::AddColumn { table, column } => {
                write!(f, "add column {table}.{}", column.name)
            }
        }
    }
}

/// Ordered set of changes produced by planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChangeSet {
    pub changes: Vec<SchemaChange>,
}

impl SchemaChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.changes.iter().flat_map(SchemaChange::statements).collect()
    }
}

/// Target definition of a tracked type's audit table.
///
/// Key columns stay non-nullable and form the primary key together with the
/// revision column. Every other mirrored column is nullable: a delete row
/// may lack data the primary table requires.
#[must_use]
pub fn audit_table_def(tracked: &TrackedType, naming: &NamingPolicy) -> TableDef {
    let mut columns: Vec<ColumnDef> = tracked
        .key_fields
        .iter()
        .map(|k| ColumnDef::new(&k.column, k.field_type, false))
        .collect();
    columns.extend(
        tracked
            .fields
            .iter()
            .chain(tracked.to_one.iter().map(|r| &r.column))
            .map(|c| ColumnDef::new(&c.column, c.field_type, true)),
    );
    columns.push(ColumnDef::new(&naming.revision_field, FieldType::Integer, false));
    columns.push(ColumnDef::new(&naming.revision_type_field, FieldType::Text, false));

    let mut primary_key: Vec<String> = tracked.key_fields.iter().map(|k| k.column.clone()).collect();
    primary_key.push(naming.revision_field.clone());

    let allowed = RevisionType::ALL
        .iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    TableDef {
        name: tracked.audit_table.clone(),
        columns,
        primary_key,
        autoincrement: false,
        checks: vec![format!(
            "{} IN ({allowed})",
            quote_ident(&naming.revision_type_field)
        )],
        foreign_keys: vec![ForeignKeyDef {
            column: naming.revision_field.clone(),
            table: naming.revision_table.clone(),
            references: "id".into(),
        }],
        indexes: vec![IndexDef {
            name: format!("{}_{}_idx", tracked.audit_table, naming.revision_field),
            columns: vec![naming.revision_field.clone()],
        }],
        required: vec![
            naming.revision_field.clone(),
            naming.revision_type_field.clone(),
        ],
    }
}

/// Target definition of an entity's primary table in the entity store.
#[must_use]
pub fn entity_table_def(mapping: &EntityMapping) -> TableDef {
    let columns = mapping
        .stored_columns()
        .into_iter()
        .map(|(field, column, field_type)| {
            let is_id = mapping.id_fields().any(|f| f.name == field);
            ColumnDef::new(&column, field_type, !is_id)
        })
        .collect();
    let primary_key: Vec<String> = mapping.id_fields().map(|f| f.column().to_string()).collect();
    TableDef {
        name: mapping.table.clone(),
        columns,
        autoincrement: mapping.has_generated_id() && primary_key.len() == 1,
        required: primary_key.clone(),
        primary_key,
        checks: Vec::new(),
        foreign_keys: Vec::new(),
        indexes: Vec::new(),
    }
}

impl ChronDb {
    /// Compare target definitions with the live schema.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidState` if an existing table lacks a
    /// required column, which cannot be repaired additively.
    pub async fn plan_tables(&self, defs: &[TableDef]) -> Result<SchemaChangeSet, DatabaseError> {
        let mut changes = Vec::new();
        for def in defs {
            let Some(existing) = self.table_columns(&def.name).await? else {
                changes.push(SchemaChange::CreateTable { table: def.clone() });
                continue;
            };
            for required in &def.required {
                if !existing.contains(required) {
                    return Err(DatabaseError::InvalidState(format!(
                        "table '{}' exists without required column '{required}'",
                        def.name
                    )));
                }
            }
            for column in &def.columns {
                if !existing.contains(&column.name) {
                    changes.push(SchemaChange::AddColumn {
                        table: def.name.clone(),
                        column: ColumnDef {
                            nullable: true,
                            ..column.clone()
                        },
                    });
                }
            }
        }
        Ok(SchemaChangeSet { changes })
    }

    /// Plan the audit schema for every tracked type without applying it.
    ///
    /// # Errors
    ///
    /// See [`Self::plan_tables`].
    pub async fn plan_audit_schema(
        &self,
        config: &AuditConfiguration,
    ) -> Result<SchemaChangeSet, DatabaseError> {
        let defs: Vec<TableDef> = config
            .tracked_types()
            .iter()
            .map(|t| audit_table_def(t, config.naming()))
            .collect();
        self.plan_tables(&defs).await
    }

    /// Apply a change set in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Migration` if any statement fails; nothing is
    /// applied in that case.
    pub async fn apply_schema(&self, changes: &SchemaChangeSet) -> Result<(), DatabaseError> {
        if changes.is_empty() {
            return Ok(());
        }
        let _gate = self.gate.lock().await;
        let tx = self.conn.transaction().await?;
        for change in &changes.changes {
            for statement in change.statements() {
                tracing::debug!(%statement, "applying schema statement");
                if let Err(e) = tx.execute(&statement, ()).await {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "schema rollback failed");
                    }
                    return Err(DatabaseError::Migration(format!("{change}: {e}")));
                }
            }
        }
        tx.commit().await?;
        for change in &changes.changes {
            tracing::info!(%change, "schema change applied");
        }
        Ok(())
    }

    /// Plan and apply the audit schema. Returns what was applied.
    ///
    /// # Errors
    ///
    /// See [`Self::plan_tables`] and [`Self::apply_schema`].
    pub async fn synchronize(
        &self,
        config: &AuditConfiguration,
    ) -> Result<SchemaChangeSet, DatabaseError> {
        let changes = self.plan_audit_schema(config).await?;
        self.apply_schema(&changes).await?;
        Ok(changes)
    }

    /// Create or extend the primary tables of every mapped entity type.
    ///
    /// # Errors
    ///
    /// See [`Self::plan_tables`] and [`Self::apply_schema`].
    pub async fn ensure_entity_tables(
        &self,
        config: &AuditConfiguration,
    ) -> Result<SchemaChangeSet, DatabaseError> {
        let defs: Vec<TableDef> = config.mappings().iter().map(entity_table_def).collect();
        let changes = self.plan_tables(&defs).await?;
        self.apply_schema(&changes).await?;
        Ok(changes)
    }
}
