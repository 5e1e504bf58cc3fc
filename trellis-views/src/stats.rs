//! Running aggregates per entity type.
//!
//! Three facets, all maintained incrementally from lifecycle events and
//! never recomputed from a scan: a total live count, a daily creation
//! histogram bucketed at UTC midnight, and a value histogram for each
//! tracked attribute.

use crate::error::{ViewError, ViewResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use trellis_model::{AttrSchema, Entity};
use trellis_store::{Storage, fanout, keys};

const DAY_MS: i64 = 86_400_000;

/// One merged snapshot of every stats facet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    /// Live entity count (creates minus deletes).
    pub total: i64,
    /// `(utc_midnight_ms, count)` pairs, ascending by day.
    pub dailies: Vec<(i64, i64)>,
    /// Tracked attribute → rendered value → count.
    pub attributes: BTreeMap<String, BTreeMap<String, i64>>,
}

pub struct StatsAggregator {
    ns: String,
    tracked: Vec<String>,
    store: Arc<dyn Storage>,
}

impl StatsAggregator {
    pub(crate) fn new(
        ns: String,
        tracked: Vec<String>,
        schema: &AttrSchema,
        store: Arc<dyn Storage>,
    ) -> ViewResult<Self> {
        for attr in &tracked {
            if !schema.contains(attr) {
                return Err(ViewError::Configuration(format!(
                    "tracked attribute '{attr}' is not declared on type '{ns}'"
                )));
            }
        }
        Ok(Self { ns, tracked, store })
    }

    pub(crate) async fn apply_created(&self, entity: &Entity) -> ViewResult<()> {
        let mut ops: Vec<BoxFuture<'_, ViewResult<()>>> = Vec::new();
        ops.push(self.incr_total().boxed());
        if let Some(created) = entity.created() {
            ops.push(self.bump_daily(day_bucket_ms(created), 1.0).boxed());
        }
        for attr in &self.tracked {
            if let Some(value) = entity.get(attr) {
                ops.push(self.bump_value(attr.clone(), value.render(), 1).boxed());
            }
        }
        fanout::all(ops).await?;
        Ok(())
    }

    /// Old and new buckets move independently, so an update that leaves a
    /// tracked value unchanged nets out to zero through two increments.
    pub(crate) async fn apply_updated(&self, entity: &Entity, old: &Entity) -> ViewResult<()> {
        let mut ops: Vec<BoxFuture<'_, ViewResult<()>>> = Vec::new();
        for attr in &self.tracked {
            if let Some(value) = old.get(attr) {
                ops.push(self.bump_value(attr.clone(), value.render(), -1).boxed());
            }
            if let Some(value) = entity.get(attr) {
                ops.push(self.bump_value(attr.clone(), value.render(), 1).boxed());
            }
        }
        fanout::all(ops).await?;
        Ok(())
    }

    pub(crate) async fn apply_deleted(&self, entity: &Entity) -> ViewResult<()> {
        let mut ops: Vec<BoxFuture<'_, ViewResult<()>>> = Vec::new();
        ops.push(self.decr_total().boxed());
        if let Some(created) = entity.created() {
            ops.push(self.bump_daily(day_bucket_ms(created), -1.0).boxed());
        }
        for attr in &self.tracked {
            if let Some(value) = entity.get(attr) {
                ops.push(self.bump_value(attr.clone(), value.render(), -1).boxed());
            }
        }
        fanout::all(ops).await?;
        Ok(())
    }

    // ── facet writes ─────────────────────────────────────────────

    async fn incr_total(&self) -> ViewResult<()> {
        self.store.incr(&keys::stats_count(&self.ns)).await?;
        Ok(())
    }

    async fn decr_total(&self) -> ViewResult<()> {
        self.store.decr(&keys::stats_count(&self.ns)).await?;
        Ok(())
    }

    async fn bump_daily(&self, day_ms: i64, delta: f64) -> ViewResult<()> {
        self.store
            .sorted_set_incr_by(&keys::stats_dailies(&self.ns), delta, &day_ms.to_string())
            .await?;
        Ok(())
    }

    async fn bump_value(&self, attr: String, value: String, delta: i64) -> ViewResult<()> {
        self.store
            .hash_incr_by(&keys::stats_attr(&self.ns, &attr), &value, delta)
            .await?;
        Ok(())
    }

    // ── report ───────────────────────────────────────────────────

    /// Reads all three facets concurrently; any single failure aborts the
    /// whole report.
    pub async fn report(&self) -> ViewResult<StatsReport> {
        let (total, dailies, attributes) =
            futures::try_join!(self.read_total(), self.read_dailies(), self.read_attrs())?;
        Ok(StatsReport {
            total,
            dailies,
            attributes,
        })
    }

    async fn read_total(&self) -> ViewResult<i64> {
        let raw = self.store.get(&keys::stats_count(&self.ns)).await?;
        Ok(raw.and_then(|s| s.parse().ok()).unwrap_or(0))
    }

    async fn read_dailies(&self) -> ViewResult<Vec<(i64, i64)>> {
        let key = keys::stats_dailies(&self.ns);
        let entries = self.store.sorted_set_range_with_scores(&key, 0, -1).await?;
        let mut dailies: Vec<(i64, i64)> = entries
            .into_iter()
            .filter_map(|(member, score)| match member.parse::<i64>() {
                Ok(day) => Some((day, score as i64)),
                Err(_) => {
                    warn!(ns = %self.ns, member, "malformed day bucket in dailies");
                    None
                }
            })
            .collect();
        dailies.sort_unstable_by_key(|&(day, _)| day);
        Ok(dailies)
    }

    async fn read_attrs(&self) -> ViewResult<BTreeMap<String, BTreeMap<String, i64>>> {
        let facets = fanout::all(self.tracked.iter().map(|attr| self.read_attr(attr))).await?;
        Ok(facets.into_iter().collect())
    }

    async fn read_attr(&self, attr: &str) -> ViewResult<(String, BTreeMap<String, i64>)> {
        let fields = self.store.hash_get_all(&keys::stats_attr(&self.ns, attr)).await?;
        let counts = fields
            .into_iter()
            .filter_map(|(value, raw)| raw.parse::<i64>().ok().map(|count| (value, count)))
            .collect();
        Ok((attr.to_string(), counts))
    }
}

/// Truncates a millisecond timestamp to its UTC midnight.
pub(crate) fn day_bucket_ms(created_ms: i64) -> i64 {
    created_ms - created_ms.rem_euclid(DAY_MS)
}
