//! In-memory contexts for command handler tests.

use chron_config::{AuditConfig, ChronConfig, DatabaseConfig, GeneralConfig};
use chron_core::entity::Entity;
use chron_core::mapping::{EntityMapping, FieldMapping, IdGenerator};
use chron_core::value::FieldType;
use chron_db::store::FlushContext;

use crate::context::AppContext;

fn tag_mapping() -> EntityMapping {
    let field = |name: &str, id: bool| FieldMapping {
        name: name.into(),
        column: None,
        field_type: FieldType::Text,
        id,
    };
    EntityMapping {
        name: "Tag".into(),
        table: "tags".into(),
        id_generator: IdGenerator::Assigned,
        fields: vec![field("slug", true), field("lang", true), field("label", false)],
        to_one: Vec::new(),
        to_many: Vec::new(),
    }
}

/// Context over an empty in-memory database, `Tag` tracked, page size 2.
pub async fn raw_context() -> AppContext {
    let settings = ChronConfig {
        database: DatabaseConfig {
            path: ":memory:".into(),
        },
        audit: AuditConfig {
            tracked: vec!["Tag".into()],
            ..AuditConfig::default()
        },
        general: GeneralConfig { page_size: 2 },
        entities: vec![tag_mapping()],
    };
    AppContext::init(settings).await.unwrap()
}

/// [`raw_context`] with primary and audit tables created.
pub async fn test_context() -> AppContext {
    let ctx = raw_context().await;
    ctx.service.ensure_entity_tables().await.unwrap();
    ctx.service.synchronize_schema().await.unwrap();
    ctx
}

/// Insert or update the `(slug, "en")` tag and return the revision id.
pub async fn record_tag(ctx: &AppContext, slug: &str, label: &str) -> i64 {
    let service = &ctx.service;
    let tag = Entity::new("Tag")
        .with("slug", slug)
        .with("lang", "en")
        .with("label", label);
    let exists = service
        .store()
        .load("Tag", &[slug.into(), "en".into()])
        .await
        .unwrap()
        .is_some();

    let mut uow = service.unit_of_work();
    if exists {
        uow.update(tag).unwrap();
    } else {
        uow.insert(tag).unwrap();
    }
    service
        .flush(uow, &FlushContext::as_user("cli-test"))
        .await
        .unwrap()
        .revision
        .unwrap()
        .id
}
