use std::collections::BTreeMap;

use chron_core::errors::CoreError;
use chron_core::snapshot::{FieldDiff, diff_values};
use chron_core::value::{FieldValue, format_key};

use super::AuditReader;
use crate::error::DatabaseError;

impl AuditReader {
    /// Fields that differ between an entity's state at `old` and at `new`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::RevisionNotFound` (wrapped) if the entity does
    /// not exist at either revision.
    pub async fn diff(
        &self,
        type_name: &str,
        key: &[FieldValue],
        old: i64,
        new: i64,
    ) -> Result<BTreeMap<String, FieldDiff>, DatabaseError> {
        let before = self.find_boundary(type_name, key, old).await?;
        let after = self.find_boundary(type_name, key, new).await?;
        Ok(diff_values(&before, &after))
    }

    async fn find_boundary(
        &self,
        type_name: &str,
        key: &[FieldValue],
        revision: i64,
    ) -> Result<BTreeMap<String, FieldValue>, DatabaseError> {
        match self.find(type_name, key, revision).await {
            Ok(snapshot) => Ok(snapshot.values),
            Err(e) if e.is_not_found() => Err(CoreError::RevisionNotFound {
                entity_type: type_name.to_string(),
                id: format_key(key),
                revision,
            }
            .into()),
            Err(e) => Err(e),
        }
    }
}
