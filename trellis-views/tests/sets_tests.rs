use pretty_assertions::assert_eq;
use std::sync::Arc;
use trellis_model::{AttrDescriptor, AttrSchema};
use trellis_store::MemoryStore;
use trellis_types::{AttrType, AttrValue, Attributes, ObjectId};
use trellis_views::{Engine, SetDef, TypeDef, ViewError, compose};

fn make_schema() -> AttrSchema {
    AttrSchema::new()
        .with_attr("title", AttrDescriptor::new(AttrType::Str).required())
        .with_attr("score", AttrDescriptor::new(AttrType::Num))
        .with_attr("hidden", AttrDescriptor::new(AttrType::Bool))
}

fn make_engine() -> Engine {
    let store = Arc::new(MemoryStore::new());
    compose(
        store,
        vec![
            TypeDef::new("posts", make_schema())
                .with_set(SetDef::scored("top", "score"))
                .with_set(SetDef::conditional("hidden", "hidden", true))
                .with_set(SetDef::conditional("visible", "hidden", false))
                .with_set(SetDef::predicate("long_titles", |e| {
                    e.get_str("title").is_some_and(|t| t.len() > 5)
                })),
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

async fn make_post(engine: &Engine, title: &str, score: f64) -> ObjectId {
    engine
        .create(
            "posts",
            attrs(&[("title", title.into()), ("score", score.into())]),
        )
        .await
        .unwrap()
        .id()
        .unwrap()
}

// ── Implicit sets ────────────────────────────────────────────────

#[tokio::test]
async fn every_entity_joins_the_all_set() {
    let engine = make_engine();
    make_post(&engine, "a", 1.0).await;
    make_post(&engine, "b", 2.0).await;

    let mut members = engine.ids("posts", "all", 0, -1).await.unwrap();
    members.sort_unstable();
    assert_eq!(members, vec![id(1), id(2)]);
}

#[tokio::test]
async fn recent_returns_newest_first() {
    let engine = make_engine();
    make_post(&engine, "a", 1.0).await;
    make_post(&engine, "b", 2.0).await;
    make_post(&engine, "c", 3.0).await;

    let page = engine.read_recent("posts", 2).await.unwrap();
    let got: Vec<_> = page
        .iter()
        .filter_map(|slot| slot.as_ref().and_then(|e| e.id()))
        .collect();
    assert_eq!(got, vec![id(3), id(2)]);
}

#[tokio::test]
async fn recent_with_zero_limit_is_empty() {
    let engine = make_engine();
    make_post(&engine, "a", 1.0).await;
    assert!(engine.read_recent("posts", 0).await.unwrap().is_empty());
}

// ── Scored sets ──────────────────────────────────────────────────

#[tokio::test]
async fn scored_set_orders_by_attribute_value() {
    let engine = make_engine();
    make_post(&engine, "a", 30.0).await;
    make_post(&engine, "b", 10.0).await;
    make_post(&engine, "c", 20.0).await;

    let ordered = engine.ids("posts", "top", 0, -1).await.unwrap();
    assert_eq!(ordered, vec![id(2), id(3), id(1)]);
}

#[tokio::test]
async fn scored_set_slices_by_rank() {
    let engine = make_engine();
    make_post(&engine, "a", 30.0).await;
    make_post(&engine, "b", 10.0).await;
    make_post(&engine, "c", 20.0).await;

    let first_two = engine.ids("posts", "top", 0, 1).await.unwrap();
    assert_eq!(first_two, vec![id(2), id(3)]);
}

#[tokio::test]
async fn missing_score_attribute_stays_out() {
    let engine = make_engine();
    engine
        .create("posts", attrs(&[("title", "unscored".into())]))
        .await
        .unwrap();

    assert!(engine.ids("posts", "top", 0, -1).await.unwrap().is_empty());
    assert_eq!(engine.ids("posts", "all", 0, -1).await.unwrap(), vec![id(1)]);
}

#[tokio::test]
async fn update_rescores_in_place() {
    let engine = make_engine();
    make_post(&engine, "a", 10.0).await;
    make_post(&engine, "b", 20.0).await;

    engine
        .update("posts", attrs(&[("id", 1.0.into()), ("score", 30.0.into())]))
        .await
        .unwrap();

    let ordered = engine.ids("posts", "top", 0, -1).await.unwrap();
    assert_eq!(ordered, vec![id(2), id(1)]);
}

// ── Conditional and predicate sets ───────────────────────────────

#[tokio::test]
async fn conditional_sets_split_on_attribute_value() {
    let engine = make_engine();
    engine
        .create(
            "posts",
            attrs(&[("title", "a".into()), ("hidden", true.into())]),
        )
        .await
        .unwrap();

    assert_eq!(engine.ids("posts", "hidden", 0, -1).await.unwrap(), vec![id(1)]);
    assert!(engine.ids("posts", "visible", 0, -1).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_moves_between_exclusive_sets() {
    let engine = make_engine();
    engine
        .create(
            "posts",
            attrs(&[("title", "a".into()), ("hidden", true.into())]),
        )
        .await
        .unwrap();
    engine
        .update(
            "posts",
            attrs(&[("id", 1.0.into()), ("hidden", false.into())]),
        )
        .await
        .unwrap();

    assert!(engine.ids("posts", "hidden", 0, -1).await.unwrap().is_empty());
    assert_eq!(engine.ids("posts", "visible", 0, -1).await.unwrap(), vec![id(1)]);
}

#[tokio::test]
async fn predicate_set_recomputes_on_update() {
    let engine = make_engine();
    engine
        .create("posts", attrs(&[("title", "hi".into())]))
        .await
        .unwrap();
    assert!(engine.ids("posts", "long_titles", 0, -1).await.unwrap().is_empty());

    engine
        .update(
            "posts",
            attrs(&[("id", 1.0.into()), ("title", "hello world".into())]),
        )
        .await
        .unwrap();
    assert_eq!(
        engine.ids("posts", "long_titles", 0, -1).await.unwrap(),
        vec![id(1)]
    );
}

// ── Delete ───────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_from_every_set() {
    let engine = make_engine();
    engine
        .create(
            "posts",
            attrs(&[
                ("title", "gone soon".into()),
                ("score", 5.0.into()),
                ("hidden", true.into()),
            ]),
        )
        .await
        .unwrap();
    engine.del("posts", id(1)).await.unwrap();

    for set in ["all", "top", "hidden", "long_titles"] {
        assert!(
            engine.ids("posts", set, 0, -1).await.unwrap().is_empty(),
            "still in '{set}'"
        );
    }
    assert!(engine.read_recent("posts", 5).await.unwrap().is_empty());
}

// ── Pages and errors ─────────────────────────────────────────────

#[tokio::test]
async fn get_resolves_a_scored_page() {
    let engine = make_engine();
    make_post(&engine, "low", 1.0).await;
    make_post(&engine, "high", 9.0).await;

    let page = engine.get("posts", "top", 0, -1).await.unwrap();
    let titles: Vec<_> = page
        .iter()
        .filter_map(|slot| slot.as_ref().and_then(|e| e.get_str("title")))
        .collect();
    assert_eq!(titles, vec!["low", "high"]);
}

#[tokio::test]
async fn undeclared_set_name_is_an_error() {
    let engine = make_engine();
    let err = engine.ids("posts", "nope", 0, -1).await.unwrap_err();
    assert!(matches!(err, ViewError::InvalidSet(name) if name == "nope"));
}

// ── Composition checks ───────────────────────────────────────────

#[tokio::test]
async fn reserved_set_names_are_rejected() {
    for reserved in ["all", "created"] {
        let err = compose(
            Arc::new(MemoryStore::new()),
            vec![
                TypeDef::new("posts", make_schema())
                    .with_set(SetDef::scored(reserved, "score")),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ViewError::Configuration(_)));
    }
}

#[tokio::test]
async fn duplicate_set_names_are_rejected() {
    let err = compose(
        Arc::new(MemoryStore::new()),
        vec![
            TypeDef::new("posts", make_schema())
                .with_set(SetDef::scored("top", "score"))
                .with_set(SetDef::conditional("top", "hidden", true)),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, ViewError::Configuration(_)));
}

#[tokio::test]
async fn undeclared_gating_attribute_is_rejected() {
    let err = compose(
        Arc::new(MemoryStore::new()),
        vec![TypeDef::new("posts", make_schema()).with_set(SetDef::scored("top", "nope"))],
    )
    .unwrap_err();
    assert!(matches!(err, ViewError::Configuration(_)));
}
