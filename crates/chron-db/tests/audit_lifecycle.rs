//! End-to-end audit lifecycle against a local database.

use std::collections::BTreeMap;
use std::sync::Arc;

use chron_core::configuration::AuditConfiguration;
use chron_core::entity::Entity;
use chron_core::errors::CoreError;
use chron_core::mapping::{EntityMapping, FieldMapping, IdGenerator};
use chron_core::naming::NamingPolicy;
use chron_core::revision::RevisionType;
use chron_core::snapshot::FieldDiff;
use chron_core::value::{FieldType, FieldValue};
use chron_db::error::DatabaseError;
use chron_db::service::AuditService;
use chron_db::store::FlushContext;
use pretty_assertions::assert_eq;

fn mapping(name: &str, table: &str, fields: &[(&str, FieldType, bool)]) -> EntityMapping {
    EntityMapping {
        name: name.into(),
        table: table.into(),
        id_generator: IdGenerator::Assigned,
        fields: fields
            .iter()
            .map(|(field, field_type, id)| FieldMapping {
                name: (*field).into(),
                column: None,
                field_type: *field_type,
                id: *id,
            })
            .collect(),
        to_one: Vec::new(),
        to_many: Vec::new(),
    }
}

async fn service() -> AuditService {
    service_at(":memory:").await
}

/// `Item` and `Tag` tracked, `Note` not. `Item.touched` is ignored.
async fn service_at(path: &str) -> AuditService {
    let naming = NamingPolicy {
        ignore_columns: vec!["touched".into()],
        ..NamingPolicy::default()
    };
    let mappings = vec![
        mapping(
            "Item",
            "items",
            &[
                ("id", FieldType::Integer, true),
                ("name", FieldType::Text, false),
                ("a", FieldType::Integer, false),
                ("b", FieldType::Integer, false),
                ("touched", FieldType::Timestamp, false),
            ],
        ),
        mapping(
            "Tag",
            "tags",
            &[
                ("slug", FieldType::Text, true),
                ("lang", FieldType::Text, true),
                ("label", FieldType::Text, false),
            ],
        ),
        mapping(
            "Note",
            "notes",
            &[("id", FieldType::Integer, true), ("text", FieldType::Text, false)],
        ),
    ];
    let config = AuditConfiguration::build(naming, mappings, &["Item".into(), "Tag".into()])
        .expect("configuration builds");
    let svc = AuditService::new_local(path, Arc::new(config))
        .await
        .expect("service opens");
    svc.ensure_entity_tables().await.expect("entity tables");
    svc.synchronize_schema().await.expect("audit schema");
    svc
}

fn item(id: i64) -> Entity {
    Entity::new("Item").with("id", id)
}

async fn insert(svc: &AuditService, entity: Entity) -> i64 {
    let mut uow = svc.unit_of_work();
    uow.insert(entity).unwrap();
    svc.flush(uow, &FlushContext::as_user("tester"))
        .await
        .unwrap()
        .revision
        .unwrap()
        .id
}

async fn update(svc: &AuditService, entity: Entity) -> i64 {
    let mut uow = svc.unit_of_work();
    uow.update(entity).unwrap();
    svc.flush(uow, &FlushContext::as_user("tester"))
        .await
        .unwrap()
        .revision
        .unwrap()
        .id
}

async fn delete(svc: &AuditService, entity: Entity) -> i64 {
    let mut uow = svc.unit_of_work();
    uow.delete(entity).unwrap();
    svc.flush(uow, &FlushContext::as_user("tester"))
        .await
        .unwrap()
        .revision
        .unwrap()
        .id
}

#[tokio::test]
async fn insert_update_delete_scenario() {
    let svc = service().await;
    let key = [FieldValue::Integer(5)];

    let r1 = insert(&svc, item(5).with("name", "foo")).await;
    let r2 = update(&svc, item(5).with("name", "bar")).await;
    assert_eq!((r1, r2), (1, 2));

    let reader = svc.reader();
    let at1 = reader.find("Item", &key, r1).await.unwrap();
    assert_eq!(at1.values["name"], FieldValue::Text("foo".into()));
    assert_eq!(at1.revision_type, RevisionType::Insert);
    let at2 = reader.find("Item", &key, r2).await.unwrap();
    assert_eq!(at2.values["name"], FieldValue::Text("bar".into()));
    assert_eq!(at2.revision_type, RevisionType::Update);

    let diff = reader.diff("Item", &key, r1, r2).await.unwrap();
    let expected = BTreeMap::from([(
        "name".to_string(),
        FieldDiff {
            old: Some("foo".into()),
            new: Some("bar".into()),
        },
    )]);
    assert_eq!(diff, expected);

    let r3 = delete(&svc, item(5)).await;
    assert_eq!(r3, 3);
    let err = reader.find("Item", &key, r3).await.unwrap_err();
    assert!(err.is_not_found());

    let history: Vec<i64> = reader
        .find_revisions("Item", &key)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(history, [1, 2, 3]);
}

#[tokio::test]
async fn round_trip_of_written_values() {
    let svc = service().await;
    let rev = insert(&svc, item(1).with("a", 1).with("b", 2)).await;

    let snapshot = svc.reader().find("Item", &[1.into()], rev).await.unwrap();
    let values = svc.reader().entity_values("Item", &snapshot).unwrap();
    assert_eq!(values["a"], FieldValue::Integer(1));
    assert_eq!(values["b"], FieldValue::Integer(2));
    assert_eq!(values["id"], FieldValue::Integer(1));
}

#[tokio::test]
async fn not_found_before_first_insert() {
    let svc = service().await;
    let other = insert(&svc, item(1)).await;
    insert(&svc, item(2)).await;

    let err = svc.reader().find("Item", &[2.into()], other).await.unwrap_err();
    assert!(matches!(err, DatabaseError::Core(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn unchanged_entity_reads_same_across_revisions() {
    let svc = service().await;
    let r1 = insert(&svc, item(1).with("name", "stable")).await;
    insert(&svc, item(2)).await;
    let r3 = insert(&svc, item(3)).await;

    let reader = svc.reader();
    let at1 = reader.find("Item", &[1.into()], r1).await.unwrap();
    let at3 = reader.find("Item", &[1.into()], r3).await.unwrap();
    assert_eq!(at1, at3);
}

#[tokio::test]
async fn diff_is_antisymmetric() {
    let svc = service().await;
    let r1 = insert(&svc, item(1).with("name", "x").with("a", 1)).await;
    let r2 = update(&svc, item(1).with("name", "y").with("b", 7)).await;

    let reader = svc.reader();
    let forward = reader.diff("Item", &[1.into()], r1, r2).await.unwrap();
    let backward = reader.diff("Item", &[1.into()], r2, r1).await.unwrap();
    assert_eq!(forward.len(), 2);
    for (field, change) in &forward {
        assert_eq!(backward[field], change.inverse());
    }
    assert!(reader.diff("Item", &[1.into()], r2, r2).await.unwrap().is_empty());
}

#[tokio::test]
async fn tracked_and_untracked_in_one_flush() {
    let svc = service().await;
    let mut uow = svc.unit_of_work();
    uow.insert(item(1).with("name", "tracked")).unwrap();
    uow.insert(Entity::new("Note").with("id", 1).with("text", "untracked"))
        .unwrap();
    let outcome = svc.flush(uow, &FlushContext::anonymous()).await.unwrap();
    let rev = outcome.revision.unwrap().id;

    assert_eq!(svc.reader().find_revision_history(10, 0).await.unwrap().len(), 1);
    let changed = svc.reader().find_entities_changed_at_revision(rev).await.unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].type_name, "Item");
}

#[tokio::test]
async fn untracked_only_flush_creates_no_revision() {
    let svc = service().await;
    let mut uow = svc.unit_of_work();
    uow.insert(Entity::new("Note").with("id", 1)).unwrap();
    let outcome = svc.flush(uow, &FlushContext::anonymous()).await.unwrap();
    assert!(outcome.revision.is_none());
    assert!(svc.reader().find_revision_history(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn changed_at_revision_spans_types() {
    let svc = service().await;
    let mut uow = svc.unit_of_work();
    uow.insert(
        Entity::new("Tag")
            .with("slug", "rust")
            .with("lang", "en")
            .with("label", "Rust"),
    )
    .unwrap();
    uow.insert(item(9)).unwrap();
    let rev = svc
        .flush(uow, &FlushContext::anonymous())
        .await
        .unwrap()
        .revision
        .unwrap()
        .id;

    let changed = svc.reader().find_entities_changed_at_revision(rev).await.unwrap();
    let summary: Vec<(&str, Vec<FieldValue>, RevisionType)> = changed
        .iter()
        .map(|c| (c.type_name.as_str(), c.key.clone(), c.revision_type))
        .collect();
    assert_eq!(
        summary,
        [
            ("Item", vec![FieldValue::Integer(9)], RevisionType::Insert),
            (
                "Tag",
                vec![FieldValue::Text("rust".into()), FieldValue::Text("en".into())],
                RevisionType::Insert
            ),
        ]
    );
}

#[tokio::test]
async fn composite_key_lookup() {
    let svc = service().await;
    let tag = |label: &str| {
        Entity::new("Tag")
            .with("slug", "rust")
            .with("lang", "de")
            .with("label", label)
    };
    let r1 = insert(&svc, tag("Rost")).await;
    let r2 = update(&svc, tag("Rust")).await;

    let tracked = svc.config().tracked("Tag").unwrap();
    let key = tracked.parse_key("rust,de").unwrap();
    let diff = svc.reader().diff("Tag", &key, r1, r2).await.unwrap();
    assert_eq!(diff.keys().collect::<Vec<_>>(), ["label"]);
}

#[tokio::test]
async fn aborted_flush_leaves_nothing() {
    let svc = service().await;
    let mut uow = svc.unit_of_work();
    uow.insert(item(1).with("name", "doomed")).unwrap();
    uow.update(item(404).with("name", "missing")).unwrap();

    let err = svc.flush(uow, &FlushContext::anonymous()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(svc.reader().find_revision_history(10, 0).await.unwrap().is_empty());
    assert_eq!(svc.store().load("Item", &[1.into()]).await.unwrap(), None);
    assert!(svc.reader().find_revisions("Item", &[1.into()]).await.is_err());
}

#[tokio::test]
async fn reinsert_after_delete_restarts_lifecycle() {
    let svc = service().await;
    let key = [FieldValue::Integer(1)];
    insert(&svc, item(1).with("name", "first")).await;
    let deleted = delete(&svc, item(1)).await;
    let again = insert(&svc, item(1).with("name", "second")).await;

    let reader = svc.reader();
    assert!(reader.find("Item", &key, deleted).await.is_err());
    let snapshot = reader.find("Item", &key, again).await.unwrap();
    assert_eq!(snapshot.values["name"], FieldValue::Text("second".into()));
    assert_eq!(snapshot.revision_type, RevisionType::Insert);
}

#[tokio::test]
async fn ignored_columns_never_audited() {
    let svc = service().await;
    let r1 = insert(&svc, item(1).with("name", "x").with("touched", "2026-01-01")).await;
    let r2 = update(&svc, item(1).with("touched", "2026-02-01")).await;

    let reader = svc.reader();
    let snapshot = reader.find("Item", &[1.into()], r2).await.unwrap();
    assert!(!snapshot.values.contains_key("touched"));
    assert!(reader.diff("Item", &[1.into()], r1, r2).await.unwrap().is_empty());

    let live = svc.store().load("Item", &[1.into()]).await.unwrap().unwrap();
    assert_eq!(live.get("touched"), Some(&FieldValue::Text("2026-02-01".into())));
}

#[tokio::test]
async fn revision_ids_strictly_increase() {
    let svc = service().await;
    let mut last = 0;
    for id in 1..=5 {
        let rev = insert(&svc, item(id)).await;
        assert!(rev > last);
        last = rev;
    }
    let ascending: Vec<i64> = svc
        .reader()
        .find_revision_history(10, 0)
        .await
        .unwrap()
        .iter()
        .rev()
        .map(|r| r.id)
        .collect();
    assert_eq!(ascending, [1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn schema_sync_is_idempotent() {
    let svc = service().await;
    assert!(svc.plan_schema().await.unwrap().is_empty());
    assert!(svc.synchronize_schema().await.unwrap().is_empty());
}

async fn count(svc: &AuditService, sql: &str) -> i64 {
    let mut rows = svc.db().conn().query(sql, ()).await.unwrap();
    rows.next().await.unwrap().unwrap().get(0).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_flushes_commit_with_their_audit_rows() {
    const FLUSHES: i64 = 48;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chronicle.db");
    let svc = Arc::new(service_at(path.to_str().unwrap()).await);

    let mut handles = Vec::new();
    for n in 0..FLUSHES {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            let mut uow = svc.unit_of_work();
            uow.insert(item(2 * n).with("name", "left")).unwrap();
            uow.insert(item(2 * n + 1).with("name", "right")).unwrap();
            svc.flush(uow, &FlushContext::as_user("worker")).await
        }));
    }
    let mut revisions = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap().expect("flush commits");
        revisions.push(outcome.revision.expect("tracked flush has a revision").id);
    }
    revisions.sort_unstable();
    revisions.dedup();
    assert_eq!(revisions.len(), usize::try_from(FLUSHES).unwrap());

    let history = svc.reader().find_revision_history(1000, 0).await.unwrap();
    let mut listed: Vec<i64> = history.iter().map(|r| r.id).collect();
    assert!(listed.windows(2).all(|w| w[0] > w[1]));
    listed.reverse();
    assert_eq!(listed, revisions);

    for rev in &revisions {
        let changed = svc
            .reader()
            .find_entities_changed_at_revision(*rev)
            .await
            .unwrap();
        assert_eq!(changed.len(), 2, "revision {rev}");
        assert!(changed.iter().all(|c| c.revision_type == RevisionType::Insert));
    }
    assert_eq!(count(&svc, "SELECT COUNT(*) FROM items").await, 2 * FLUSHES);
    assert_eq!(count(&svc, "SELECT COUNT(*) FROM items_audit").await, 2 * FLUSHES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_a_partial_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chronicle.db");
    let svc = Arc::new(service_at(path.to_str().unwrap()).await);

    let writer = {
        let svc = Arc::clone(&svc);
        tokio::spawn(async move {
            for n in 0..32_i64 {
                let mut uow = svc.unit_of_work();
                for offset in 0..3 {
                    uow.insert(item(3 * n + offset)).unwrap();
                }
                svc.flush(uow, &FlushContext::anonymous()).await.unwrap();
            }
        })
    };
    while !writer.is_finished() {
        for revision in svc.reader().find_revision_history(5, 0).await.unwrap() {
            let changed = svc
                .reader()
                .find_entities_changed_at_revision(revision.id)
                .await
                .unwrap();
            assert_eq!(changed.len(), 3, "revision {}", revision.id);
        }
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn delete_and_reinsert_in_one_flush_records_only_new_values() {
    let svc = service().await;
    insert(&svc, item(1).with("name", "old").with("a", 5).with("b", 6)).await;

    let mut uow = svc.unit_of_work();
    uow.delete(item(1)).unwrap();
    uow.insert(item(1).with("name", "new")).unwrap();
    let rev = svc
        .flush(uow, &FlushContext::as_user("tester"))
        .await
        .unwrap()
        .revision
        .unwrap()
        .id;

    let snapshot = svc.reader().find("Item", &[1.into()], rev).await.unwrap();
    assert_eq!(snapshot.revision_type, RevisionType::Update);
    assert_eq!(snapshot.values.get("name"), Some(&FieldValue::from("new")));
    assert_eq!(snapshot.values.get("a"), Some(&FieldValue::Null));
    assert_eq!(snapshot.values.get("b"), Some(&FieldValue::Null));
}
