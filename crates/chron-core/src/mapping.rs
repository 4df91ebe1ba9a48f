//! Structural metadata the primary store exposes for each entity type.
//!
//! An `EntityMapping` describes a table, its columns, which of them form the
//! identifier, and the relations hanging off it. Mappings are usually
//! declared in configuration (`[[entities]]` tables) and are the input to
//! metadata resolution.

use serde::{Deserialize, Serialize};

use crate::value::FieldType;

/// How an entity's identifier is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGenerator {
    /// The caller supplies the key before flush.
    #[default]
    Assigned,
    /// The database assigns the key on insert (integer auto-increment).
    Database,
}

/// A scalar field mapped to one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    /// Column name; defaults to the field name.
    #[serde(default)]
    pub column: Option<String>,
    pub field_type: FieldType,
    /// Whether this field is part of the identifier.
    #[serde(default)]
    pub id: bool,
}

impl FieldMapping {
    #[must_use]
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// A to-one relation stored as a single foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMapping {
    pub name: String,
    /// Name of the target entity type.
    pub target: String,
    /// Foreign-key column; defaults to `{name}_id`.
    #[serde(default)]
    pub column: Option<String>,
    /// Type of the foreign-key value (the target's identifier type).
    #[serde(default = "default_fk_type")]
    pub field_type: FieldType,
}

const fn default_fk_type() -> FieldType {
    FieldType::Integer
}

impl AssociationMapping {
    #[must_use]
    pub fn column(&self) -> String {
        self.column
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.name))
    }
}

/// Full structural description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub id_generator: IdGenerator,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    #[serde(default)]
    pub to_one: Vec<AssociationMapping>,
    /// Collection-valued relations. Never stored as columns.
    #[serde(default)]
    pub to_many: Vec<String>,
}

impl EntityMapping {
    /// Identifier fields in declaration order.
    pub fn id_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.id)
    }

    /// Non-identifier scalar fields in declaration order.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| !f.id)
    }

    /// Every stored `(field name, column, type)` triple: identifier fields,
    /// then other scalars, then to-one foreign keys.
    #[must_use]
    pub fn stored_columns(&self) -> Vec<(String, String, FieldType)> {
        let scalars = self
            .id_fields()
            .chain(self.value_fields())
            .map(|f| (f.name.clone(), f.column().to_string(), f.field_type));
        let relations = self
            .to_one
            .iter()
            .map(|r| (r.name.clone(), r.column(), r.field_type));
        scalars.chain(relations).collect()
    }

    #[must_use]
    pub fn has_generated_id(&self) -> bool {
        self.id_generator == IdGenerator::Database
    }
}
