//! Metadata resolver: entity mapping → audit shape.
//!
//! Resolution is a pure function of the mapping and the naming policy, so
//! results are cached per type name for the life of the process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::CoreError;
use crate::mapping::EntityMapping;
use crate::naming::NamingPolicy;
use crate::tracked::{MirroredColumn, RelationField, TrackedType};
use crate::value::FieldType;

pub struct MetadataResolver {
    naming: NamingPolicy,
    cache: RwLock<HashMap<String, Arc<TrackedType>>>,
}

impl MetadataResolver {
    #[must_use]
    pub fn new(naming: NamingPolicy) -> Self {
        Self {
            naming,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    /// Derive the audit shape of an entity type.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnsupportedMapping` when the type has no
    /// identifier, a database-generated key that is not a single integer
    /// column, an ignored identifier column, a column that collides with the
    /// audit-only columns, or two fields sharing a column.
    pub fn resolve(&self, mapping: &EntityMapping) -> Result<Arc<TrackedType>, CoreError> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&mapping.name)
        {
            return Ok(Arc::clone(hit));
        }

        let tracked = Arc::new(self.derive(mapping)?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mapping.name.clone(), Arc::clone(&tracked));
        Ok(tracked)
    }

    fn derive(&self, mapping: &EntityMapping) -> Result<TrackedType, CoreError> {
        let name = mapping.name.as_str();
        let ids: Vec<_> = mapping.id_fields().collect();
        if ids.is_empty() {
            return Err(CoreError::unsupported(name, "no identifier field"));
        }
        if mapping.has_generated_id() {
            if ids.len() != 1 {
                return Err(CoreError::unsupported(
                    name,
                    "database-generated identifiers must be a single column",
                ));
            }
            if ids[0].field_type != FieldType::Integer {
                return Err(CoreError::unsupported(
                    name,
                    format!(
                        "database-generated identifier '{}' must be an integer, found {}",
                        ids[0].name, ids[0].field_type
                    ),
                ));
            }
        }

        let mut seen = HashSet::new();
        for (field, column, _) in mapping.stored_columns() {
            if self.naming.is_reserved(&column) {
                return Err(CoreError::unsupported(
                    name,
                    format!("column '{column}' of field '{field}' is reserved for audit bookkeeping"),
                ));
            }
            if !seen.insert(column.clone()) {
                return Err(CoreError::unsupported(
                    name,
                    format!("column '{column}' is mapped more than once"),
                ));
            }
        }

        let mirror = |field: &str, column: &str, field_type| MirroredColumn {
            field: field.to_string(),
            column: column.to_string(),
            field_type,
        };

        let mut key_fields = Vec::with_capacity(ids.len());
        for id in ids {
            if self.naming.is_ignored(id.column()) {
                return Err(CoreError::unsupported(
                    name,
                    format!("identifier column '{}' cannot be ignored", id.column()),
                ));
            }
            key_fields.push(mirror(&id.name, id.column(), id.field_type));
        }

        let fields = mapping
            .value_fields()
            .filter(|f| !self.naming.is_ignored(f.column()))
            .map(|f| mirror(&f.name, f.column(), f.field_type))
            .collect();

        let to_one = mapping
            .to_one
            .iter()
            .filter(|r| !self.naming.is_ignored(&r.column()))
            .map(|r| RelationField {
                column: mirror(&r.name, &r.column(), r.field_type),
                target: r.target.clone(),
            })
            .collect();

        Ok(TrackedType {
            name: mapping.name.clone(),
            table: mapping.table.clone(),
            audit_table: self.naming.audit_table(&mapping.table),
            key_fields,
            fields,
            to_one,
            to_many: mapping.to_many.clone(),
            generated_key: mapping.has_generated_id(),
        })
    }
}
