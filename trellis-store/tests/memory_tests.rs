use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use trellis_store::{MemoryStore, Storage, StoreError, StoredRecord, keys};
use trellis_types::ObjectId;

fn record(pairs: &[(&str, &str)]) -> StoredRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── object records ───────────────────────────────────────────────

#[tokio::test]
async fn create_assigns_sequential_ids() {
    let store = MemoryStore::new();
    let first = store
        .create_object("users", record(&[("name", "ada")]))
        .await
        .unwrap();
    let second = store
        .create_object("users", record(&[("name", "grace")]))
        .await
        .unwrap();
    assert_eq!(first.get("id").map(String::as_str), Some("1"));
    assert_eq!(second.get("id").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn create_stamps_timestamps() {
    let store = MemoryStore::new();
    let rec = store.create_object("users", record(&[])).await.unwrap();
    let created: i64 = rec.get("created").unwrap().parse().unwrap();
    let updated: i64 = rec.get("updated").unwrap().parse().unwrap();
    assert!(created > 0);
    assert_eq!(created, updated);
}

#[tokio::test]
async fn sequences_are_per_namespace() {
    let store = MemoryStore::new();
    let user = store.create_object("users", record(&[])).await.unwrap();
    let post = store.create_object("posts", record(&[])).await.unwrap();
    assert_eq!(user.get("id").map(String::as_str), Some("1"));
    assert_eq!(post.get("id").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn sequence_is_readable_as_counter() {
    let store = MemoryStore::new();
    store.create_object("users", record(&[])).await.unwrap();
    store.create_object("users", record(&[])).await.unwrap();
    let head = store.get(&keys::sequence("users")).await.unwrap();
    assert_eq!(head.as_deref(), Some("2"));
}

#[tokio::test]
async fn external_id_create_skips_sequence() {
    let store = MemoryStore::new();
    let rec = store
        .create_object_with_id("users", ObjectId::from_u64(40), record(&[("name", "ada")]))
        .await
        .unwrap();
    assert_eq!(rec.get("id").map(String::as_str), Some("40"));
    assert_eq!(store.get(&keys::sequence("users")).await.unwrap(), None);

    let read = store
        .read_object("users", ObjectId::from_u64(40))
        .await
        .unwrap();
    assert_eq!(read.unwrap().get("name").map(String::as_str), Some("ada"));
}

#[tokio::test]
async fn read_roundtrips_fields() {
    let store = MemoryStore::new();
    let rec = store
        .create_object("posts", record(&[("title", "kickass"), ("hidden", "false")]))
        .await
        .unwrap();
    let id: ObjectId = rec.get("id").unwrap().parse::<u64>().unwrap().into();

    let read = store.read_object("posts", id).await.unwrap().unwrap();
    assert_eq!(read.get("title").map(String::as_str), Some("kickass"));
    assert_eq!(read.get("hidden").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn read_absent_is_none() {
    let store = MemoryStore::new();
    let read = store
        .read_object("posts", ObjectId::from_u64(99))
        .await
        .unwrap();
    assert_eq!(read, None);
}

#[tokio::test]
async fn update_merges_fields() {
    let store = MemoryStore::new();
    let rec = store
        .create_object("posts", record(&[("title", "old"), ("hidden", "true")]))
        .await
        .unwrap();
    let id: ObjectId = rec.get("id").unwrap().parse::<u64>().unwrap().into();

    store
        .update_object("posts", id, record(&[("title", "new")]))
        .await
        .unwrap();

    let read = store.read_object("posts", id).await.unwrap().unwrap();
    assert_eq!(read.get("title").map(String::as_str), Some("new"));
    assert_eq!(read.get("hidden").map(String::as_str), Some("true"));
}

#[tokio::test]
async fn delete_removes_record() {
    let store = MemoryStore::new();
    let rec = store.create_object("posts", record(&[])).await.unwrap();
    let id: ObjectId = rec.get("id").unwrap().parse::<u64>().unwrap().into();

    assert!(store.object_exists("posts", id).await.unwrap());
    store.delete_object("posts", id).await.unwrap();
    assert!(!store.object_exists("posts", id).await.unwrap());
    assert_eq!(store.read_object("posts", id).await.unwrap(), None);

    // deleting again is a no-op
    store.delete_object("posts", id).await.unwrap();
}

// ── sets ─────────────────────────────────────────────────────────

#[tokio::test]
async fn set_membership() {
    let store = MemoryStore::new();
    store.set_add("posts.hidden", "1").await.unwrap();
    store.set_add("posts.hidden", "2").await.unwrap();
    store.set_add("posts.hidden", "2").await.unwrap();

    let members = store.set_members("posts.hidden").await.unwrap();
    assert_eq!(members, vec!["1".to_string(), "2".to_string()]);
    assert!(store.set_is_member("posts.hidden", "1").await.unwrap());
    assert!(!store.set_is_member("posts.hidden", "3").await.unwrap());

    store.set_remove("posts.hidden", "1").await.unwrap();
    assert!(!store.set_is_member("posts.hidden", "1").await.unwrap());
}

#[tokio::test]
async fn absent_set_is_empty() {
    let store = MemoryStore::new();
    assert_eq!(store.set_members("nope").await.unwrap(), Vec::<String>::new());
    assert!(!store.set_is_member("nope", "1").await.unwrap());
}

// ── sorted sets ──────────────────────────────────────────────────

#[tokio::test]
async fn sorted_set_orders_by_score() {
    let store = MemoryStore::new();
    store.sorted_set_add("z", 30.0, "c").await.unwrap();
    store.sorted_set_add("z", 10.0, "a").await.unwrap();
    store.sorted_set_add("z", 20.0, "b").await.unwrap();

    let asc = store.sorted_set_range("z", 0, -1).await.unwrap();
    assert_eq!(asc, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    let desc = store.sorted_set_rev_range("z", 0, -1).await.unwrap();
    assert_eq!(desc, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
}

#[tokio::test]
async fn sorted_set_add_overwrites_score() {
    let store = MemoryStore::new();
    store.sorted_set_add("z", 1.0, "a").await.unwrap();
    store.sorted_set_add("z", 2.0, "b").await.unwrap();
    store.sorted_set_add("z", 3.0, "a").await.unwrap();

    let asc = store.sorted_set_range("z", 0, -1).await.unwrap();
    assert_eq!(asc, vec!["b".to_string(), "a".to_string()]);
}

#[tokio::test]
async fn sorted_set_range_slices_inclusively() {
    let store = MemoryStore::new();
    for (score, member) in [(1.0, "a"), (2.0, "b"), (3.0, "c"), (4.0, "d")] {
        store.sorted_set_add("z", score, member).await.unwrap();
    }

    assert_eq!(
        store.sorted_set_range("z", 0, 1).await.unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(
        store.sorted_set_range("z", 1, 2).await.unwrap(),
        vec!["b".to_string(), "c".to_string()]
    );
    assert_eq!(
        store.sorted_set_range("z", -2, -1).await.unwrap(),
        vec!["c".to_string(), "d".to_string()]
    );
    assert_eq!(
        store.sorted_set_range("z", 2, 100).await.unwrap(),
        vec!["c".to_string(), "d".to_string()]
    );
    assert_eq!(
        store.sorted_set_range("z", 3, 1).await.unwrap(),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn sorted_set_remove_takes_member() {
    let store = MemoryStore::new();
    store.sorted_set_add("z", 5.0, "a").await.unwrap();
    store.sorted_set_remove("z", "a").await.unwrap();
    assert_eq!(
        store.sorted_set_range("z", 0, -1).await.unwrap(),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn sorted_set_incr_by_accumulates() {
    let store = MemoryStore::new();
    assert_eq!(store.sorted_set_incr_by("d", 1.0, "day").await.unwrap(), 1.0);
    assert_eq!(store.sorted_set_incr_by("d", 1.0, "day").await.unwrap(), 2.0);
    assert_eq!(store.sorted_set_incr_by("d", -1.0, "day").await.unwrap(), 1.0);

    let with_scores = store.sorted_set_range_with_scores("d", 0, -1).await.unwrap();
    assert_eq!(with_scores, vec![("day".to_string(), 1.0)]);
}

#[tokio::test]
async fn absent_sorted_set_is_empty() {
    let store = MemoryStore::new();
    assert_eq!(
        store.sorted_set_range("nope", 0, -1).await.unwrap(),
        Vec::<String>::new()
    );
}

// ── hashes ───────────────────────────────────────────────────────

#[tokio::test]
async fn hash_fields() {
    let store = MemoryStore::new();
    store.hash_set("users.index.name", "ada", "1").await.unwrap();
    store.hash_set("users.index.name", "grace", "2").await.unwrap();

    assert_eq!(
        store.hash_get("users.index.name", "ada").await.unwrap(),
        Some("1".to_string())
    );
    assert_eq!(store.hash_get("users.index.name", "x").await.unwrap(), None);

    let all = store.hash_get_all("users.index.name").await.unwrap();
    let mut expected = BTreeMap::new();
    expected.insert("ada".to_string(), "1".to_string());
    expected.insert("grace".to_string(), "2".to_string());
    assert_eq!(all, expected);

    store.hash_delete("users.index.name", "ada").await.unwrap();
    assert_eq!(store.hash_get("users.index.name", "ada").await.unwrap(), None);
}

#[tokio::test]
async fn hash_set_overwrites_field() {
    let store = MemoryStore::new();
    store.hash_set("h", "f", "1").await.unwrap();
    store.hash_set("h", "f", "2").await.unwrap();
    assert_eq!(store.hash_get("h", "f").await.unwrap(), Some("2".to_string()));
}

#[tokio::test]
async fn hash_incr_by_starts_at_zero() {
    let store = MemoryStore::new();
    assert_eq!(store.hash_incr_by("h", "count", 1).await.unwrap(), 1);
    assert_eq!(store.hash_incr_by("h", "count", 2).await.unwrap(), 3);
    assert_eq!(store.hash_incr_by("h", "count", -3).await.unwrap(), 0);
}

#[tokio::test]
async fn hash_incr_by_reaches_object_fields() {
    // Count attributes live on the parent record itself.
    let store = MemoryStore::new();
    let rec = store
        .create_object("companies", record(&[("employeesCount", "0")]))
        .await
        .unwrap();
    let id: ObjectId = rec.get("id").unwrap().parse::<u64>().unwrap().into();

    store
        .hash_incr_by(&keys::object("companies", id), "employeesCount", 1)
        .await
        .unwrap();

    let read = store.read_object("companies", id).await.unwrap().unwrap();
    assert_eq!(read.get("employeesCount").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn hash_incr_by_rejects_malformed() {
    let store = MemoryStore::new();
    store.hash_set("h", "f", "kickass").await.unwrap();
    let err = store.hash_incr_by("h", "f", 1).await.unwrap_err();
    assert!(matches!(err, StoreError::MalformedNumber { .. }));
}

// ── counters ─────────────────────────────────────────────────────

#[tokio::test]
async fn incr_decr_roundtrip() {
    let store = MemoryStore::new();
    assert_eq!(store.incr("c").await.unwrap(), 1);
    assert_eq!(store.incr("c").await.unwrap(), 2);
    assert_eq!(store.decr("c").await.unwrap(), 1);
    assert_eq!(store.get("c").await.unwrap(), Some("1".to_string()));
}

#[tokio::test]
async fn decr_can_go_negative() {
    let store = MemoryStore::new();
    assert_eq!(store.decr("c").await.unwrap(), -1);
}

#[tokio::test]
async fn get_absent_is_none() {
    let store = MemoryStore::new();
    assert_eq!(store.get("nope").await.unwrap(), None);
}

// ── kind discipline ──────────────────────────────────────────────

#[tokio::test]
async fn set_verb_on_counter_key_is_kind_mismatch() {
    let store = MemoryStore::new();
    store.incr("c").await.unwrap();
    let err = store.set_add("c", "1").await.unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));
}

#[tokio::test]
async fn counter_verb_on_set_key_is_kind_mismatch() {
    let store = MemoryStore::new();
    store.set_add("s", "1").await.unwrap();
    let err = store.incr("s").await.unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));
}

#[tokio::test]
async fn sorted_set_verb_on_plain_set_is_kind_mismatch() {
    let store = MemoryStore::new();
    store.set_add("s", "1").await.unwrap();
    let err = store.sorted_set_add("s", 1.0, "1").await.unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));
}
