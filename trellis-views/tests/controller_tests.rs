use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use trellis_model::{AttrDescriptor, AttrSchema, Entity, LifecycleObserver, ModelError};
use trellis_store::{MemoryStore, Storage};
use trellis_types::{AttrType, AttrValue, Attributes, ObjectId};
use trellis_views::{
    DeleteRule, Engine, RelationDef, SetDef, TypeDef, ViewError, compose,
};

fn post_schema() -> AttrSchema {
    AttrSchema::new()
        .with_attr("title", AttrDescriptor::new(AttrType::Str).required())
        .with_attr("score", AttrDescriptor::new(AttrType::Num))
}

fn make_engine(store: Arc<MemoryStore>) -> Engine {
    compose(
        store,
        vec![
            TypeDef::new("posts", post_schema())
                .with_index("title")
                .with_set(SetDef::scored("top", "score"))
                .with_tracked("title"),
        ],
    )
    .unwrap()
}

fn attrs(pairs: &[(&str, AttrValue)]) -> Attributes {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn id(n: u64) -> ObjectId {
    ObjectId::from_u64(n)
}

// ── Resolution ───────────────────────────────────────────────────

#[tokio::test]
async fn unknown_type_is_an_error_everywhere() {
    let engine = make_engine(Arc::new(MemoryStore::new()));

    let err = engine.read("nope", id(1)).await.unwrap_err();
    assert!(matches!(err, ViewError::UnknownType(name) if name == "nope"));

    let err = engine.report("nope").await.unwrap_err();
    assert!(matches!(err, ViewError::UnknownType(_)));

    let err = engine.ids("nope", "all", 0, -1).await.unwrap_err();
    assert!(matches!(err, ViewError::UnknownType(_)));
}

#[tokio::test]
async fn model_accessor_resolves_by_name() {
    let engine = make_engine(Arc::new(MemoryStore::new()));
    assert_eq!(engine.model("posts").unwrap().name(), "posts");
    assert!(engine.model("nope").is_err());
}

#[tokio::test]
async fn model_errors_pass_through() {
    let engine = make_engine(Arc::new(MemoryStore::new()));
    let err = engine.create("posts", Attributes::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ViewError::Model(ModelError::MissingRequired { .. })
    ));
}

#[tokio::test]
async fn compose_rejects_duplicate_type_names() {
    let err = compose(
        Arc::new(MemoryStore::new()),
        vec![
            TypeDef::new("posts", post_schema()),
            TypeDef::new("posts", post_schema()),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ViewError::Configuration(_)));
}

// ── Event ordering ───────────────────────────────────────────────

struct Spy {
    store: Arc<MemoryStore>,
    seen: Mutex<Vec<(&'static str, u64, bool)>>,
}

impl Spy {
    fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<(&'static str, u64, bool)> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    async fn in_all_set(&self, entity: &Entity) -> bool {
        let member = entity.id().unwrap().to_string();
        self.store.set_is_member("posts.all", &member).await.unwrap()
    }
}

#[async_trait]
impl LifecycleObserver for Spy {
    async fn created(&self, entity: &Entity) -> anyhow::Result<()> {
        let present = self.in_all_set(entity).await;
        self.seen
            .lock()
            .unwrap()
            .push(("created", entity.id().unwrap().as_u64(), present));
        Ok(())
    }

    async fn updated(&self, entity: &Entity, _old: &Entity) -> anyhow::Result<()> {
        let present = self.in_all_set(entity).await;
        self.seen
            .lock()
            .unwrap()
            .push(("updated", entity.id().unwrap().as_u64(), present));
        Ok(())
    }

    async fn deleted(&self, entity: &Entity) -> anyhow::Result<()> {
        let present = self.in_all_set(entity).await;
        self.seen
            .lock()
            .unwrap()
            .push(("deleted", entity.id().unwrap().as_u64(), present));
        Ok(())
    }
}

#[tokio::test]
async fn outward_subscribers_hear_events_after_views_settle() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(store.clone());
    let spy = Arc::new(Spy::new(store));
    engine.subscribe("posts", spy.clone()).unwrap();

    engine
        .create("posts", attrs(&[("title", "a".into())]))
        .await
        .unwrap();
    engine
        .update("posts", attrs(&[("id", 1.0.into()), ("title", "b".into())]))
        .await
        .unwrap();
    engine.del("posts", id(1)).await.unwrap();

    // Membership observed from inside the observer proves the views ran
    // first: present on created, already gone on deleted.
    assert_eq!(
        spy.take(),
        vec![("created", 1, true), ("updated", 1, true), ("deleted", 1, false)]
    );
}

#[tokio::test]
async fn update_silent_skips_views_and_observers() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(store.clone());
    let spy = Arc::new(Spy::new(store.clone()));
    engine
        .create("posts", attrs(&[("title", "quiet".into())]))
        .await
        .unwrap();
    engine.subscribe("posts", spy.clone()).unwrap();

    engine
        .update_silent(
            "posts",
            attrs(&[("id", 1.0.into()), ("title", "louder".into())]),
        )
        .await
        .unwrap();

    assert!(spy.take().is_empty());
    // The index never heard about the rename.
    assert_eq!(
        store.hash_get("posts.index.title", "quiet").await.unwrap(),
        Some("1".to_string())
    );
    assert_eq!(
        store.hash_get("posts.index.title", "louder").await.unwrap(),
        None
    );
    // The record itself did change.
    let entity = engine.read("posts", id(1)).await.unwrap();
    assert_eq!(entity.get_str("title"), Some("louder"));
}

// ── Surface odds and ends ────────────────────────────────────────

#[tokio::test]
async fn count_tracks_issued_ids_not_live_records() {
    let engine = make_engine(Arc::new(MemoryStore::new()));
    engine
        .create("posts", attrs(&[("title", "a".into())]))
        .await
        .unwrap();
    engine
        .create("posts", attrs(&[("title", "b".into())]))
        .await
        .unwrap();
    engine.del("posts", id(1)).await.unwrap();

    assert_eq!(engine.count("posts").await.unwrap(), 2);
}

#[tokio::test]
async fn store_accessor_shares_the_backing_store() {
    let store = Arc::new(MemoryStore::new());
    let engine = make_engine(store.clone());
    engine.store().incr("scratch").await.unwrap();
    assert_eq!(store.get("scratch").await.unwrap(), Some("1".to_string()));
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn composed_types_work_together() {
    let company_schema =
        AttrSchema::new().with_attr("name", AttrDescriptor::new(AttrType::Str).required());
    let person_schema = AttrSchema::new()
        .with_attr("name", AttrDescriptor::new(AttrType::Str).required())
        .with_attr("email", AttrDescriptor::new(AttrType::Str))
        .with_attr("companyId", AttrDescriptor::new(AttrType::Num))
        .with_attr("salary", AttrDescriptor::new(AttrType::Num));

    let store = Arc::new(MemoryStore::new());
    let engine = compose(
        store,
        vec![
            TypeDef::new("companies", company_schema).with_relationship(
                RelationDef::new("employees", "people", "companyId")
                    .with_count()
                    .with_sorted_set("salary")
                    .with_delete_rule(DeleteRule::Cascade),
            ),
            TypeDef::new("people", person_schema)
                .with_index("email")
                .with_set(SetDef::scored("earners", "salary"))
                .with_tracked("name"),
        ],
    )
    .unwrap();

    let company = engine
        .create("companies", attrs(&[("name", "acme".into())]))
        .await
        .unwrap()
        .id()
        .unwrap();
    for (name, email, salary) in [
        ("alice", "a@x", 120.0),
        ("bob", "b@x", 80.0),
        ("cara", "c@x", 100.0),
    ] {
        engine
            .create(
                "people",
                attrs(&[
                    ("name", name.into()),
                    ("email", email.into()),
                    ("companyId", company.as_num().into()),
                    ("salary", salary.into()),
                ]),
            )
            .await
            .unwrap();
    }

    // Index lookup.
    let hits = engine
        .find("people", &attrs(&[("email", "b@x".into())]))
        .await
        .unwrap();
    assert_eq!(hits[0].as_ref().unwrap().get_str("name"), Some("bob"));

    // Scored set page, ascending by salary.
    let earners = engine.ids("people", "earners", 0, -1).await.unwrap();
    assert_eq!(earners, vec![id(2), id(3), id(1)]);

    // Relationship sorted set, descending.
    let ranked = engine
        .related_sorted_ids("companies", company, "employees", "salary", 0, -1, true)
        .await
        .unwrap();
    assert_eq!(ranked, vec![id(1), id(3), id(2)]);

    // Count attribute on the parent record.
    let snapshot = engine.read("companies", company).await.unwrap();
    assert_eq!(snapshot.get_number("employeesCount"), Some(3.0));

    // Stats saw every create.
    let report = engine.report("people").await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.attributes["name"].len(), 3);

    // Recent page, newest first.
    let recent = engine.read_recent("people", 2).await.unwrap();
    let names: Vec<_> = recent
        .iter()
        .filter_map(|slot| slot.as_ref().and_then(|e| e.get_str("name")))
        .collect();
    assert_eq!(names, vec!["cara", "bob"]);

    // Cascade leaves nothing behind.
    engine.del("companies", company).await.unwrap();
    assert_eq!(engine.report("people").await.unwrap().total, 0);
    assert!(engine.ids("people", "all", 0, -1).await.unwrap().is_empty());
    assert!(
        engine
            .find("people", &attrs(&[("email", "a@x".into())]))
            .await
            .unwrap()
            .is_empty()
    );
}
