//! Reconstructed entity state and field-level diffs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::revision::RevisionType;
use crate::value::FieldValue;

/// Field values of an entity as of a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub type_name: String,
    pub key: Vec<FieldValue>,
    pub values: BTreeMap<String, FieldValue>,
    /// Revision of the audit row the snapshot was read from.
    pub revision: i64,
    pub revision_type: RevisionType,
}

/// One entity touched by a revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedEntity {
    pub type_name: String,
    pub key: Vec<FieldValue>,
    pub revision_type: RevisionType,
    pub snapshot: EntitySnapshot,
}

/// Old and new value of one field. `None` means the field was absent on
/// that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old: Option<FieldValue>,
    pub new: Option<FieldValue>,
}

impl FieldDiff {
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Compare two field maps. Only differing fields are returned; a field
/// present on one side only counts as differing.
#[must_use]
pub fn diff_values(
    old: &BTreeMap<String, FieldValue>,
    new: &BTreeMap<String, FieldValue>,
) -> BTreeMap<String, FieldDiff> {
    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let (before, after) = (old.get(field), new.get(field));
            (before != after).then(|| {
                (
                    field.clone(),
                    FieldDiff {
                        old: before.cloned(),
                        new: after.cloned(),
                    },
                )
            })
        })
        .collect()
}
