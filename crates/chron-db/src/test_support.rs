//! Shared test utilities for chron-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use std::sync::Arc;

    use chron_core::configuration::AuditConfiguration;
    use chron_core::mapping::{AssociationMapping, EntityMapping, FieldMapping, IdGenerator};
    use chron_core::naming::NamingPolicy;
    use chron_core::value::FieldType;

    use crate::ChronDb;
    use crate::service::AuditService;

    fn field(name: &str, field_type: FieldType, id: bool) -> FieldMapping {
        FieldMapping {
            name: name.into(),
            column: None,
            field_type,
            id,
        }
    }

    /// `Author` (tracked, assigned key), `Article` (tracked, generated key,
    /// to-one `author`), and `Session` (untracked, text key).
    pub fn test_mappings() -> Vec<EntityMapping> {
        vec![
            EntityMapping {
                name: "Author".into(),
                table: "authors".into(),
                id_generator: IdGenerator::Assigned,
                fields: vec![
                    field("id", FieldType::Integer, true),
                    field("name", FieldType::Text, false),
                ],
                to_one: Vec::new(),
                to_many: vec!["articles".into()],
            },
            EntityMapping {
                name: "Article".into(),
                table: "articles".into(),
                id_generator: IdGenerator::Database,
                fields: vec![
                    field("id", FieldType::Integer, true),
                    field("title", FieldType::Text, false),
                    field("body", FieldType::Text, false),
                    field("published", FieldType::Boolean, false),
                    field("updated_at", FieldType::Timestamp, false),
                ],
                to_one: vec![AssociationMapping {
                    name: "author".into(),
                    target: "Author".into(),
                    column: None,
                    field_type: FieldType::Integer,
                }],
                to_many: Vec::new(),
            },
            EntityMapping {
                name: "Session".into(),
                table: "sessions".into(),
                id_generator: IdGenerator::Assigned,
                fields: vec![
                    field("token", FieldType::Text, true),
                    field("user", FieldType::Text, false),
                ],
                to_one: Vec::new(),
                to_many: Vec::new(),
            },
        ]
    }

    pub fn test_naming() -> NamingPolicy {
        NamingPolicy {
            ignore_columns: vec!["updated_at".into()],
            ..NamingPolicy::default()
        }
    }

    pub fn test_configuration() -> Arc<AuditConfiguration> {
        let config = AuditConfiguration::build(
            test_naming(),
            test_mappings(),
            &["Author".to_string(), "Article".to_string()],
        )
        .unwrap();
        Arc::new(config)
    }

    /// In-memory database with the revision log only.
    pub async fn test_db() -> ChronDb {
        ChronDb::open_local(":memory:", &test_naming()).await.unwrap()
    }

    /// In-memory service with entity tables and audit schema in place.
    pub async fn test_service() -> AuditService {
        let svc = AuditService::new_local(":memory:", test_configuration())
            .await
            .unwrap();
        svc.ensure_entity_tables().await.unwrap();
        svc.synchronize_schema().await.unwrap();
        svc
    }
}
