//! The storage client abstraction.
//!
//! Defines the verb set every backend must provide. The engine composes
//! all of its behavior, primary records and derived views alike, from
//! these primitives; each verb is individually atomic at the backend, but
//! no group of verbs is transactional.

use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use trellis_types::ObjectId;

/// An object record as stored: every field rendered to its string form.
pub type StoredRecord = BTreeMap<String, String>;

/// A key-value backend with object, set, sorted-set, hash, and counter
/// verbs.
///
/// Object records live at `keys::object(ns, id)` as field hashes, which
/// means the hash verbs address record fields directly when handed an
/// object key; the reference registry's counter and pointer attributes
/// depend on that aliasing.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Creates an object, assigning the next id from the namespace's
    /// sequence and stamping `created`/`updated` (milliseconds since
    /// epoch). Returns the record as stored.
    async fn create_object(&self, ns: &str, fields: StoredRecord) -> StoreResult<StoredRecord>;

    /// Creates an object under a caller-supplied id, stamping timestamps
    /// but leaving the namespace sequence untouched. Any existing record
    /// at that id is replaced; uniqueness is the caller's responsibility.
    async fn create_object_with_id(
        &self,
        ns: &str,
        id: ObjectId,
        fields: StoredRecord,
    ) -> StoreResult<StoredRecord>;

    /// Reads an object record, `None` when absent.
    async fn read_object(&self, ns: &str, id: ObjectId) -> StoreResult<Option<StoredRecord>>;

    /// Merges fields into an object record and bumps `updated`. Merging
    /// into an absent id creates the record.
    async fn update_object(&self, ns: &str, id: ObjectId, fields: StoredRecord)
    -> StoreResult<()>;

    /// Deletes an object record. Deleting an absent id is a no-op.
    async fn delete_object(&self, ns: &str, id: ObjectId) -> StoreResult<()>;

    /// Returns whether an object record exists.
    async fn object_exists(&self, ns: &str, id: ObjectId) -> StoreResult<bool>;

    // ── sets ─────────────────────────────────────────────────────

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Full membership of a set; absent keys are empty sets.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn set_is_member(&self, key: &str, member: &str) -> StoreResult<bool>;

    // ── sorted sets ──────────────────────────────────────────────

    /// Adds a member with a score, overwriting the score if the member is
    /// already present.
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> StoreResult<()>;

    async fn sorted_set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Members in ascending score order, sliced by the inclusive
    /// `start..end` index range where negative indexes count from the end
    /// (`0, -1` is the whole set).
    async fn sorted_set_range(&self, key: &str, start: i64, end: i64)
    -> StoreResult<Vec<String>>;

    /// Members in descending score order, same slicing rules.
    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>>;

    /// Ascending range carrying each member's score.
    async fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<(String, f64)>>;

    /// Adjusts a member's score by a delta, treating an absent member as
    /// score zero. Returns the new score.
    async fn sorted_set_incr_by(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64>;

    // ── hashes ───────────────────────────────────────────────────

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// All fields of a hash; absent keys are empty hashes.
    async fn hash_get_all(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()>;

    /// Integer-increments a hash field, treating an absent field as zero.
    /// Returns the new value.
    async fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    // ── plain values and counters ────────────────────────────────

    /// Reads a plain string value, `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Integer-increments a plain value, treating absence as zero.
    /// Returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Integer-decrements a plain value, treating absence as zero.
    /// Returns the new value.
    async fn decr(&self, key: &str) -> StoreResult<i64>;
}
