//! Process-wide audit configuration.
//!
//! Built once at startup from the naming policy, the store's entity
//! mappings, and the list of tracked type names. Immutable afterwards and
//! shared as `Arc<AuditConfiguration>` by the recorder, the reader, and the
//! schema synchronizer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::CoreError;
use crate::mapping::EntityMapping;
use crate::naming::NamingPolicy;
use crate::resolver::MetadataResolver;
use crate::tracked::TrackedType;

#[derive(Debug)]
pub struct AuditConfiguration {
    naming: NamingPolicy,
    mappings: Vec<EntityMapping>,
    tracked: Vec<Arc<TrackedType>>,
    by_name: HashMap<String, Arc<TrackedType>>,
}

impl AuditConfiguration {
    /// Resolve every tracked type and cross-check relations between types.
    ///
    /// # Errors
    ///
    /// - `CoreError::Validation` if two mappings share a name.
    /// - `CoreError::UnknownType` if a tracked name has no mapping.
    /// - `CoreError::UnsupportedMapping` if a tracked type cannot be
    ///   mirrored, two tracked types share an audit table, or a to-one
    ///   relation points at an unknown type, a composite key, or a key of a
    ///   different type.
    pub fn build(
        naming: NamingPolicy,
        mappings: Vec<EntityMapping>,
        tracked_names: &[String],
    ) -> Result<Self, CoreError> {
        let mut names = HashSet::new();
        for mapping in &mappings {
            if !names.insert(mapping.name.as_str()) {
                return Err(CoreError::Validation(format!(
                    "entity type '{}' is mapped more than once",
                    mapping.name
                )));
            }
        }

        let resolver = MetadataResolver::new(naming.clone());
        let mut tracked = Vec::with_capacity(tracked_names.len());
        let mut by_name = HashMap::new();
        let mut audit_tables = HashSet::new();

        for name in tracked_names {
            if by_name.contains_key(name) {
                continue;
            }
            let mapping = mappings
                .iter()
                .find(|m| &m.name == name)
                .ok_or_else(|| CoreError::UnknownType(name.clone()))?;
            let resolved = resolver.resolve(mapping)?;

            if !audit_tables.insert(resolved.audit_table.clone()) {
                return Err(CoreError::unsupported(
                    name,
                    format!("audit table '{}' is already used by another type", resolved.audit_table),
                ));
            }
            check_relations(&resolved, &mappings)?;

            by_name.insert(name.clone(), Arc::clone(&resolved));
            tracked.push(resolved);
        }

        Ok(Self {
            naming,
            mappings,
            tracked,
            by_name,
        })
    }

    #[must_use]
    pub const fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    /// Structural metadata of any mapped type, tracked or not.
    #[must_use]
    pub fn mapping(&self, name: &str) -> Option<&EntityMapping> {
        self.mappings.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn mappings(&self) -> &[EntityMapping] {
        &self.mappings
    }

    /// Tracked types in configuration order.
    #[must_use]
    pub fn tracked_types(&self) -> &[Arc<TrackedType>] {
        &self.tracked
    }

    #[must_use]
    pub fn is_tracked(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Look up a tracked type by name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownType` if the type is not tracked.
    pub fn tracked(&self, name: &str) -> Result<&Arc<TrackedType>, CoreError> {
        self.by_name
            .get(name)
            .ok_or_else(|| CoreError::UnknownType(name.to_string()))
    }
}

fn check_relations(tracked: &TrackedType, mappings: &[EntityMapping]) -> Result<(), CoreError> {
    for relation in &tracked.to_one {
        let field = &relation.column.field;
        let target = mappings
            .iter()
            .find(|m| m.name == relation.target)
            .ok_or_else(|| {
                CoreError::unsupported(
                    &tracked.name,
                    format!("relation '{field}' targets unknown type '{}'", relation.target),
                )
            })?;
        let ids: Vec<_> = target.id_fields().collect();
        match ids.as_slice() {
            [id] if id.field_type == relation.column.field_type => {}
            [id] => {
                return Err(CoreError::unsupported(
                    &tracked.name,
                    format!(
                        "relation '{field}' is declared {} but {}.{} is {}",
                        relation.column.field_type, target.name, id.name, id.field_type
                    ),
                ));
            }
            _ => {
                return Err(CoreError::unsupported(
                    &tracked.name,
                    format!(
                        "relation '{field}' targets '{}', which has a composite or missing key",
                        target.name
                    ),
                ));
            }
        }
    }
    Ok(())
}
