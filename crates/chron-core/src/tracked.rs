//! Resolved shape of an audited entity type.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::errors::CoreError;
use crate::value::{FieldType, FieldValue};

/// One field mirrored into the audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirroredColumn {
    /// Field name on the entity.
    pub field: String,
    /// Column name in both the primary and the audit table.
    pub column: String,
    pub field_type: FieldType,
}

/// A to-one relation mirrored as its foreign-key value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationField {
    pub column: MirroredColumn,
    pub target: String,
}

/// An entity type under audit, as derived by the metadata resolver.
///
/// Immutable once built. Owned by the audit configuration and shared
/// behind `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedType {
    pub name: String,
    pub table: String,
    pub audit_table: String,
    pub key_fields: Vec<MirroredColumn>,
    pub fields: Vec<MirroredColumn>,
    pub to_one: Vec<RelationField>,
    /// Collection relations. Listed for reference only, never mirrored.
    pub to_many: Vec<String>,
    pub generated_key: bool,
}

impl TrackedType {
    /// All mirrored columns: keys, scalar fields, then foreign keys.
    pub fn mirrored(&self) -> impl Iterator<Item = &MirroredColumn> {
        self.key_fields
            .iter()
            .chain(self.fields.iter())
            .chain(self.to_one.iter().map(|r| &r.column))
    }

    /// Check that a key has one component per identifier field.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidKey` on an arity mismatch.
    pub fn check_key(&self, key: &[FieldValue]) -> Result<(), CoreError> {
        if key.len() == self.key_fields.len() {
            Ok(())
        } else {
            Err(CoreError::InvalidKey {
                entity_type: self.name.clone(),
                reason: format!(
                    "expected {} key component(s), got {}",
                    self.key_fields.len(),
                    key.len()
                ),
            })
        }
    }

    /// Parse a comma-separated identifier (`"5"`, `"3,en"`) into key values
    /// typed after the identifier fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidKey` if the component count is wrong or a
    /// component is not a literal of its field's type.
    pub fn parse_key(&self, raw: &str) -> Result<Vec<FieldValue>, CoreError> {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() != self.key_fields.len() {
            return Err(CoreError::InvalidKey {
                entity_type: self.name.clone(),
                reason: format!(
                    "'{raw}' has {} component(s), expected {}",
                    parts.len(),
                    self.key_fields.len()
                ),
            });
        }
        parts
            .iter()
            .zip(&self.key_fields)
            .map(|(part, field)| {
                field
                    .field_type
                    .parse(part)
                    .ok_or_else(|| CoreError::InvalidKey {
                        entity_type: self.name.clone(),
                        reason: format!("'{part}' is not a valid {} for {}", field.field_type, field.field),
                    })
            })
            .collect()
    }

    /// Extract the key from a field map, if every identifier field is set
    /// and non-null.
    #[must_use]
    pub fn key_of(&self, values: &BTreeMap<String, FieldValue>) -> Option<Vec<FieldValue>> {
        self.key_fields
            .iter()
            .map(|f| values.get(&f.field).filter(|v| !v.is_null()).cloned())
            .collect()
    }

    /// Flatten a field map into displayable pairs.
    ///
    /// Only mirrored fields are returned. To-one relations appear under the
    /// relation name with the target's key value, never a nested object.
    #[must_use]
    pub fn entity_values(&self, values: &BTreeMap<String, FieldValue>) -> HashMap<String, FieldValue> {
        self.mirrored()
            .map(|col| {
                let value = values.get(&col.field).cloned().unwrap_or(FieldValue::Null);
                (col.field.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation() -> TrackedType {
        let col = |name: &str, field_type| MirroredColumn {
            field: name.into(),
            column: name.into(),
            field_type,
        };
        TrackedType {
            name: "Translation".into(),
            table: "translations".into(),
            audit_table: "translations_audit".into(),
            key_fields: vec![col("article", FieldType::Integer), col("locale", FieldType::Text)],
            fields: vec![col("body", FieldType::Text)],
            to_one: vec![RelationField {
                column: MirroredColumn {
                    field: "editor".into(),
                    column: "editor_id".into(),
                    field_type: FieldType::Integer,
                },
                target: "User".into(),
            }],
            to_many: vec!["revisions".into()],
            generated_key: false,
        }
    }

    #[test]
    fn parse_composite_key() {
        let key = translation().parse_key("3,en").unwrap();
        assert_eq!(key, vec![FieldValue::Integer(3), FieldValue::Text("en".into())]);
    }

    #[test]
    fn parse_key_rejects_wrong_arity() {
        let err = translation().parse_key("3").unwrap_err();
        assert!(matches!(err, CoreError::InvalidKey { .. }));
    }

    #[test]
    fn parse_key_rejects_bad_component() {
        let err = translation().parse_key("three,en").unwrap_err();
        assert!(err.to_string().contains("three"));
    }

    #[test]
    fn key_of_requires_every_component() {
        let tracked = translation();
        let mut values = BTreeMap::new();
        values.insert("article".to_string(), FieldValue::Integer(1));
        assert_eq!(tracked.key_of(&values), None);

        values.insert("locale".to_string(), FieldValue::Text("de".into()));
        assert_eq!(
            tracked.key_of(&values),
            Some(vec![FieldValue::Integer(1), FieldValue::Text("de".into())])
        );
    }

    #[test]
    fn entity_values_flattens_relations_and_skips_unmapped() {
        let tracked = translation();
        let mut values = BTreeMap::new();
        values.insert("article".to_string(), FieldValue::Integer(1));
        values.insert("locale".to_string(), FieldValue::Text("de".into()));
        values.insert("editor".to_string(), FieldValue::Integer(9));
        values.insert("revisions".to_string(), FieldValue::Text("ignored".into()));

        let flat = tracked.entity_values(&values);
        assert_eq!(flat.len(), 4);
        assert_eq!(flat["editor"], FieldValue::Integer(9));
        assert_eq!(flat["body"], FieldValue::Null);
        assert!(!flat.contains_key("revisions"));
    }
}
