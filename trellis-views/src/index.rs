//! Unique secondary indexes.
//!
//! Each indexed attribute reverse-maps `rendered value → id` in a hash at
//! `<ns>.index.<attr>`. A value maps to at most one id; writing a value
//! that is already mapped silently overwrites the previous id, so
//! uniqueness of indexed values is the caller's contract, not an enforced
//! constraint.

use crate::error::{ViewError, ViewResult};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use trellis_model::{AttrSchema, Entity};
use trellis_store::{Storage, fanout, keys};
use trellis_types::{AttrValue, Attributes, ObjectId};

/// Maintains the reverse-lookup hashes for one entity type.
pub struct IndexMaintainer {
    ns: String,
    attrs: Vec<String>,
    store: Arc<dyn Storage>,
}

impl IndexMaintainer {
    /// Every indexed attribute must be declared on the schema.
    pub(crate) fn new(
        ns: String,
        attrs: Vec<String>,
        schema: &AttrSchema,
        store: Arc<dyn Storage>,
    ) -> ViewResult<Self> {
        for attr in &attrs {
            if !schema.contains(attr) {
                return Err(ViewError::Configuration(format!(
                    "indexed attribute '{attr}' is not declared on '{ns}'"
                )));
            }
        }
        Ok(Self { ns, attrs, store })
    }

    #[must_use]
    pub fn attrs(&self) -> &[String] {
        &self.attrs
    }

    pub(crate) async fn apply_created(&self, entity: &Entity) -> ViewResult<()> {
        self.add(entity).await
    }

    /// Stale mappings for the old value come out before the new value's
    /// mapping goes in.
    pub(crate) async fn apply_updated(&self, entity: &Entity, old: &Entity) -> ViewResult<()> {
        self.remove(old).await?;
        self.add(entity).await
    }

    pub(crate) async fn apply_deleted(&self, entity: &Entity) -> ViewResult<()> {
        self.remove(entity).await
    }

    async fn add(&self, entity: &Entity) -> ViewResult<()> {
        fanout::all(self.attrs.iter().map(|attr| self.add_one(attr, entity))).await?;
        Ok(())
    }

    async fn remove(&self, entity: &Entity) -> ViewResult<()> {
        fanout::all(self.attrs.iter().map(|attr| self.remove_one(attr, entity))).await?;
        Ok(())
    }

    async fn add_one(&self, attr: &str, entity: &Entity) -> ViewResult<()> {
        let (Some(id), Some(value)) = (entity.id(), entity.get(attr)) else {
            return Ok(());
        };
        self.store
            .hash_set(&keys::index(&self.ns, attr), &value.render(), &id.to_string())
            .await?;
        Ok(())
    }

    async fn remove_one(&self, attr: &str, entity: &Entity) -> ViewResult<()> {
        let Some(value) = entity.get(attr) else {
            return Ok(());
        };
        self.store
            .hash_delete(&keys::index(&self.ns, attr), &value.render())
            .await?;
        Ok(())
    }

    /// Looks up one indexed value, `None` when unmapped.
    pub async fn lookup(&self, attr: &str, value: &AttrValue) -> ViewResult<Option<ObjectId>> {
        if !self.attrs.iter().any(|a| a == attr) {
            return Err(ViewError::Configuration(format!(
                "'{attr}' is not indexed on '{}'",
                self.ns
            )));
        }
        self.find_one(attr, value).await
    }

    /// Resolves every search term against its index concurrently and
    /// returns the ids that were mapped, in declared-attribute order.
    /// Terms for attributes that are not indexed are ignored.
    pub async fn find(&self, terms: &Attributes) -> ViewResult<Vec<ObjectId>> {
        let lookups = self
            .attrs
            .iter()
            .filter_map(|attr| terms.get(attr.as_str()).map(|value| (attr, value)))
            .map(|(attr, value)| self.find_one(attr, value));
        let hits = fanout::all(lookups).await?;
        Ok(hits.into_iter().flatten().collect())
    }

    async fn find_one(&self, attr: &str, value: &AttrValue) -> ViewResult<Option<ObjectId>> {
        let raw = self
            .store
            .hash_get(&keys::index(&self.ns, attr), &value.render())
            .await?;
        Ok(raw.and_then(|raw| self.parse_id(&raw)))
    }

    fn parse_id(&self, raw: &str) -> Option<ObjectId> {
        match ObjectId::from_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(ns = %self.ns, raw, "malformed id in index mapping");
                None
            }
        }
    }
}
