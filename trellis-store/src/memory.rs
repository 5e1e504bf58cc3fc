//! In-memory storage backend.
//!
//! A complete [`Storage`] implementation over a single locked keyspace,
//! used by the test suites and by in-process embeddings. Semantics follow
//! the Redis model the key scheme was designed against: one kind of value
//! per key, verbs atomic per call, nothing atomic across calls.

use crate::client::{Storage, StoredRecord};
use crate::error::{StoreError, StoreResult};
use crate::keys;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use trellis_types::ObjectId;

#[derive(Debug, Clone)]
enum Slot {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    Zset(BTreeMap<String, f64>),
}

impl Slot {
    const fn kind(&self) -> &'static str {
        match self {
            Slot::Str(_) => "string",
            Slot::Hash(_) => "hash",
            Slot::Set(_) => "set",
            Slot::Zset(_) => "sorted set",
        }
    }
}

/// In-process [`Storage`] backend.
///
/// One `RwLock` guards the whole keyspace, so each verb is atomic for the
/// duration of its single lock hold.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Slot) -> StoreError {
    StoreError::KindMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

fn hash_entry<'a>(
    slots: &'a mut HashMap<String, Slot>,
    key: &str,
) -> StoreResult<&'a mut BTreeMap<String, String>> {
    let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::Hash(BTreeMap::new()));
    match slot {
        Slot::Hash(h) => Ok(h),
        other => Err(mismatch(key, "hash", other)),
    }
}

fn set_entry<'a>(
    slots: &'a mut HashMap<String, Slot>,
    key: &str,
) -> StoreResult<&'a mut BTreeSet<String>> {
    let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::Set(BTreeSet::new()));
    match slot {
        Slot::Set(s) => Ok(s),
        other => Err(mismatch(key, "set", other)),
    }
}

fn zset_entry<'a>(
    slots: &'a mut HashMap<String, Slot>,
    key: &str,
) -> StoreResult<&'a mut BTreeMap<String, f64>> {
    let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::Zset(BTreeMap::new()));
    match slot {
        Slot::Zset(z) => Ok(z),
        other => Err(mismatch(key, "sorted set", other)),
    }
}

fn incr_value(slots: &mut HashMap<String, Slot>, key: &str, delta: i64) -> StoreResult<i64> {
    let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Slot::Str("0".to_string()));
    match slot {
        Slot::Str(s) => {
            let current: i64 = s.parse().map_err(|_| StoreError::MalformedNumber {
                key: key.to_string(),
                raw: s.clone(),
            })?;
            let next = current + delta;
            *s = next.to_string();
            Ok(next)
        }
        other => Err(mismatch(key, "string", other)),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Resolves an inclusive Redis-style index range against a length.
/// Negative indexes count from the end. Returns a half-open slice range,
/// or `None` when the selection is empty.
fn slice_bounds(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let n = len as i64;
    let mut s = if start < 0 { n + start } else { start };
    let mut e = if end < 0 { n + end } else { end };
    if s < 0 {
        s = 0;
    }
    if e >= n {
        e = n - 1;
    }
    if s > e || s >= n || e < 0 {
        return None;
    }
    Some((s as usize, (e + 1) as usize))
}

/// Sorted-set pairs in ascending (score, member) order.
fn zset_ordered(z: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = z.iter().map(|(m, s)| (m.clone(), *s)).collect();
    pairs.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    pairs
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_object(&self, ns: &str, fields: StoredRecord) -> StoreResult<StoredRecord> {
        let mut slots = self.slots.write().await;
        let next = incr_value(&mut slots, &keys::sequence(ns), 1)?;
        let id = u64::try_from(next)
            .map(ObjectId::from_u64)
            .map_err(|_| StoreError::Backend(format!("id sequence for {ns} went negative")))?;

        let mut record = fields;
        let now = now_ms().to_string();
        record.insert("id".to_string(), id.to_string());
        record.insert("created".to_string(), now.clone());
        record.insert("updated".to_string(), now);

        slots.insert(keys::object(ns, id), Slot::Hash(record.clone()));
        debug!(ns, %id, "object created");
        Ok(record)
    }

    async fn create_object_with_id(
        &self,
        ns: &str,
        id: ObjectId,
        fields: StoredRecord,
    ) -> StoreResult<StoredRecord> {
        let mut slots = self.slots.write().await;

        let mut record = fields;
        let now = now_ms().to_string();
        record.insert("id".to_string(), id.to_string());
        record.insert("created".to_string(), now.clone());
        record.insert("updated".to_string(), now);

        slots.insert(keys::object(ns, id), Slot::Hash(record.clone()));
        debug!(ns, %id, "object created with external id");
        Ok(record)
    }

    async fn read_object(&self, ns: &str, id: ObjectId) -> StoreResult<Option<StoredRecord>> {
        let key = keys::object(ns, id);
        let slots = self.slots.read().await;
        match slots.get(&key) {
            None => Ok(None),
            Some(Slot::Hash(h)) => Ok(Some(h.clone())),
            Some(other) => Err(mismatch(&key, "hash", other)),
        }
    }

    async fn update_object(
        &self,
        ns: &str,
        id: ObjectId,
        fields: StoredRecord,
    ) -> StoreResult<()> {
        let key = keys::object(ns, id);
        let mut slots = self.slots.write().await;
        let record = hash_entry(&mut slots, &key)?;
        for (field, value) in fields {
            record.insert(field, value);
        }
        record.insert("updated".to_string(), now_ms().to_string());
        Ok(())
    }

    async fn delete_object(&self, ns: &str, id: ObjectId) -> StoreResult<()> {
        let key = keys::object(ns, id);
        let mut slots = self.slots.write().await;
        slots.remove(&key);
        debug!(ns, %id, "object deleted");
        Ok(())
    }

    async fn object_exists(&self, ns: &str, id: ObjectId) -> StoreResult<bool> {
        let slots = self.slots.read().await;
        Ok(matches!(
            slots.get(&keys::object(ns, id)),
            Some(Slot::Hash(_))
        ))
    }

    // ── sets ─────────────────────────────────────────────────────

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        set_entry(&mut slots, key)?.insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key) {
            match slot {
                Slot::Set(s) => {
                    s.remove(member);
                }
                other => return Err(mismatch(key, "set", other)),
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let slots = self.slots.read().await;
        match slots.get(key) {
            None => Ok(Vec::new()),
            Some(Slot::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(other) => Err(mismatch(key, "set", other)),
        }
    }

    async fn set_is_member(&self, key: &str, member: &str) -> StoreResult<bool> {
        let slots = self.slots.read().await;
        match slots.get(key) {
            None => Ok(false),
            Some(Slot::Set(s)) => Ok(s.contains(member)),
            Some(other) => Err(mismatch(key, "set", other)),
        }
    }

    // ── sorted sets ──────────────────────────────────────────────

    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        zset_entry(&mut slots, key)?.insert(member.to_string(), score);
        Ok(())
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key) {
            match slot {
                Slot::Zset(z) => {
                    z.remove(member);
                }
                other => return Err(mismatch(key, "sorted set", other)),
            }
        }
        Ok(())
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .sorted_set_range_with_scores(key, start, end)
            .await?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<String>> {
        let slots = self.slots.read().await;
        let pairs = match slots.get(key) {
            None => return Ok(Vec::new()),
            Some(Slot::Zset(z)) => zset_ordered(z),
            Some(other) => return Err(mismatch(key, "sorted set", other)),
        };
        let mut rev: Vec<String> = pairs.into_iter().map(|(member, _)| member).collect();
        rev.reverse();
        match slice_bounds(rev.len(), start, end) {
            None => Ok(Vec::new()),
            Some((s, e)) => Ok(rev[s..e].to_vec()),
        }
    }

    async fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<(String, f64)>> {
        let slots = self.slots.read().await;
        let pairs = match slots.get(key) {
            None => return Ok(Vec::new()),
            Some(Slot::Zset(z)) => zset_ordered(z),
            Some(other) => return Err(mismatch(key, "sorted set", other)),
        };
        match slice_bounds(pairs.len(), start, end) {
            None => Ok(Vec::new()),
            Some((s, e)) => Ok(pairs[s..e].to_vec()),
        }
    }

    async fn sorted_set_incr_by(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        let mut slots = self.slots.write().await;
        let z = zset_entry(&mut slots, key)?;
        let score = z.entry(member.to_string()).or_insert(0.0);
        *score += delta;
        Ok(*score)
    }

    // ── hashes ───────────────────────────────────────────────────

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        hash_entry(&mut slots, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let slots = self.slots.read().await;
        match slots.get(key) {
            None => Ok(None),
            Some(Slot::Hash(h)) => Ok(h.get(field).cloned()),
            Some(other) => Err(mismatch(key, "hash", other)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let slots = self.slots.read().await;
        match slots.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Slot::Hash(h)) => Ok(h.clone()),
            Some(other) => Err(mismatch(key, "hash", other)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(key) {
            match slot {
                Slot::Hash(h) => {
                    h.remove(field);
                }
                other => return Err(mismatch(key, "hash", other)),
            }
        }
        Ok(())
    }

    async fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut slots = self.slots.write().await;
        let h = hash_entry(&mut slots, key)?;
        let current: i64 = match h.get(field) {
            None => 0,
            Some(raw) => raw.parse().map_err(|_| StoreError::MalformedNumber {
                key: format!("{key}.{field}"),
                raw: raw.clone(),
            })?,
        };
        let next = current + delta;
        h.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    // ── plain values and counters ────────────────────────────────

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let slots = self.slots.read().await;
        match slots.get(key) {
            None => Ok(None),
            Some(Slot::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut slots = self.slots.write().await;
        incr_value(&mut slots, key, 1)
    }

    async fn decr(&self, key: &str) -> StoreResult<i64> {
        let mut slots = self.slots.write().await;
        incr_value(&mut slots, key, -1)
    }
}
