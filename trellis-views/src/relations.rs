//! Parent→child reference registries.
//!
//! A relationship is declared on the parent type but listens to the
//! *child* type's lifecycle: a child appearing with a foreign key gets
//! referenced under that parent, a child losing or changing it gets
//! dereferenced or moved. Each reference touches several keys (a counter
//! and pointer on the parent record itself, per-attribute sorted sets,
//! the membership set); the writes fan out concurrently and the declared
//! hook fires only after every one has landed.
//!
//! The counter and pointer writes address the parent's object record
//! through the hash verbs. That aliasing is deliberate: `<ns>.<id>` is a
//! field hash, so `employeesCount` lives on the company record itself.

use crate::error::{ViewError, ViewResult};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};
use trellis_model::{Entity, EntityHook, LifecycleObserver, Model};
use trellis_store::{Storage, fanout, keys};
use trellis_types::ObjectId;

/// Predicate evaluated against a child snapshot; returning `false` vetoes
/// the reference work entirely.
pub type RelationFilter = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Runs after a reference has been fully added or removed, once every
/// fan-out write has completed. A failing hook surfaces as the event
/// handler's error.
#[async_trait]
pub trait RelationHook: Send + Sync {
    async fn run(&self, parent: ObjectId, child: &Entity) -> anyhow::Result<()>;
}

/// What happens to referenced children when their parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteRule {
    /// Leave the children alone; their foreign keys dangle.
    #[default]
    Nullify,
    /// Delete every referenced child along with the parent.
    Cascade,
}

/// Declares one relationship on a parent type.
#[derive(Clone)]
pub struct RelationDef {
    pub(crate) name: String,
    pub(crate) child_type: String,
    pub(crate) parent_key: String,
    pub(crate) delete_rule: DeleteRule,
    pub(crate) count_attribute: Option<String>,
    pub(crate) current_attribute: Option<String>,
    pub(crate) sorted_sets: Vec<String>,
    pub(crate) filter: Option<RelationFilter>,
    pub(crate) added: Option<Arc<dyn RelationHook>>,
    pub(crate) removed: Option<Arc<dyn RelationHook>>,
}

impl RelationDef {
    /// A nullify relationship named `name`, referencing children of
    /// `child_type` through their `parent_key` attribute.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        child_type: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            child_type: child_type.into(),
            parent_key: parent_key.into(),
            delete_rule: DeleteRule::Nullify,
            count_attribute: None,
            current_attribute: None,
            sorted_sets: Vec::new(),
            filter: None,
            added: None,
            removed: None,
        }
    }

    #[must_use]
    pub fn with_delete_rule(mut self, rule: DeleteRule) -> Self {
        self.delete_rule = rule;
        self
    }

    /// Keeps a reference count on the parent record under
    /// `<name>Count`.
    #[must_use]
    pub fn with_count(self) -> Self {
        let attr = format!("{}Count", self.name);
        self.with_count_attr(attr)
    }

    /// Keeps a reference count on the parent record under an explicit
    /// attribute name.
    #[must_use]
    pub fn with_count_attr(mut self, attr: impl Into<String>) -> Self {
        self.count_attribute = Some(attr.into());
        self
    }

    /// Keeps the most recently referenced child id on the parent record.
    #[must_use]
    pub fn with_current_attr(mut self, attr: impl Into<String>) -> Self {
        self.current_attribute = Some(attr.into());
        self
    }

    /// Keeps a per-parent sorted set of children ranked by the named
    /// child attribute. Children without the attribute are not ranked.
    #[must_use]
    pub fn with_sorted_set(mut self, attr: impl Into<String>) -> Self {
        self.sorted_sets.push(attr.into());
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&Entity) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn on_added(mut self, hook: Arc<dyn RelationHook>) -> Self {
        self.added = Some(hook);
        self
    }

    #[must_use]
    pub fn on_removed(mut self, hook: Arc<dyn RelationHook>) -> Self {
        self.removed = Some(hook);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A relationship bound to its resolved child model.
pub(crate) struct BoundRelation {
    pub(crate) def: RelationDef,
    pub(crate) child: Arc<Model>,
}

/// All relationships of one parent type.
pub struct RelationRegistry {
    parent_ns: String,
    relations: Vec<BoundRelation>,
    store: Arc<dyn Storage>,
}

impl RelationRegistry {
    pub(crate) fn new(
        parent_ns: String,
        relations: Vec<BoundRelation>,
        store: Arc<dyn Storage>,
    ) -> Self {
        Self {
            parent_ns,
            relations,
            store,
        }
    }

    fn relation(&self, name: &str) -> ViewResult<&BoundRelation> {
        self.relations
            .iter()
            .find(|bound| bound.def.name == name)
            .ok_or_else(|| ViewError::InvalidRelationship(name.to_string()))
    }

    fn foreign_key(def: &RelationDef, child: &Entity) -> Option<ObjectId> {
        // Ids are issued from 1; a zero foreign key reads as detached.
        child
            .get_number(&def.parent_key)
            .and_then(ObjectId::from_num)
            .filter(|id| id.as_num() != 0.0)
    }

    // ── lifecycle reactions ──────────────────────────────────────

    pub(crate) async fn child_created(&self, index: usize, child: &Entity) -> ViewResult<()> {
        let bound = &self.relations[index];
        match Self::foreign_key(&bound.def, child) {
            Some(parent) => self.add_reference(bound, parent, child).await,
            None => Ok(()),
        }
    }

    /// A reference moves if and only if the foreign key changed between
    /// the snapshots; attach and detach are half-moves. Same-parent edits
    /// cause no reference work.
    pub(crate) async fn child_updated(
        &self,
        index: usize,
        child: &Entity,
        old: &Entity,
    ) -> ViewResult<()> {
        let bound = &self.relations[index];
        let new_fk = Self::foreign_key(&bound.def, child);
        let old_fk = Self::foreign_key(&bound.def, old);
        if new_fk == old_fk {
            return Ok(());
        }
        if let Some(old_parent) = old_fk {
            self.remove_reference(bound, old_parent, old).await?;
        }
        if let Some(new_parent) = new_fk {
            self.add_reference(bound, new_parent, child).await?;
        }
        Ok(())
    }

    pub(crate) async fn child_deleted(&self, index: usize, child: &Entity) -> ViewResult<()> {
        let bound = &self.relations[index];
        match Self::foreign_key(&bound.def, child) {
            Some(parent) => self.remove_reference(bound, parent, child).await,
            None => Ok(()),
        }
    }

    async fn add_reference(
        &self,
        bound: &BoundRelation,
        parent: ObjectId,
        child: &Entity,
    ) -> ViewResult<()> {
        if let Some(filter) = &bound.def.filter {
            if !filter(child) {
                return Ok(());
            }
        }
        let Some(child_id) = child.id() else {
            return Ok(());
        };
        let member = child_id.to_string();
        let parent_record = keys::object(&self.parent_ns, parent);
        let rel = &bound.def.name;

        // Counter and pointer writes land on the parent record; skipped
        // when it is gone so a field write cannot resurrect it.
        let parent_alive = self.store.object_exists(&self.parent_ns, parent).await?;

        let mut ops: Vec<BoxFuture<'_, ViewResult<()>>> = Vec::new();
        if let Some(attr) = bound.def.count_attribute.as_ref().filter(|_| parent_alive) {
            ops.push(self.incr_count(parent_record.clone(), attr.clone(), 1).boxed());
        }
        if let Some(attr) = bound.def.current_attribute.as_ref().filter(|_| parent_alive) {
            ops.push(
                self.set_current(parent_record.clone(), attr.clone(), member.clone())
                    .boxed(),
            );
        }
        for attr in &bound.def.sorted_sets {
            if let Some(score) = child.get_number(attr) {
                let key = keys::relation_sorted(&self.parent_ns, parent, rel, attr);
                ops.push(self.add_ranked(key, score, member.clone()).boxed());
            }
        }
        ops.push(
            self.add_member(keys::relation(&self.parent_ns, parent, rel), member.clone())
                .boxed(),
        );

        fanout::all(ops).await?;
        debug!(ns = %self.parent_ns, %parent, rel, child = %child_id, "reference added");

        if let Some(hook) = &bound.def.added {
            hook.run(parent, child).await.map_err(ViewError::Hook)?;
        }
        Ok(())
    }

    async fn remove_reference(
        &self,
        bound: &BoundRelation,
        parent: ObjectId,
        child: &Entity,
    ) -> ViewResult<()> {
        if let Some(filter) = &bound.def.filter {
            if !filter(child) {
                return Ok(());
            }
        }
        let Some(child_id) = child.id() else {
            return Ok(());
        };
        let member = child_id.to_string();
        let parent_record = keys::object(&self.parent_ns, parent);
        let rel = &bound.def.name;

        // Cascaded children dereference a parent that is already gone;
        // its record fields must stay gone.
        let parent_alive = self.store.object_exists(&self.parent_ns, parent).await?;

        let mut ops: Vec<BoxFuture<'_, ViewResult<()>>> = Vec::new();
        if let Some(attr) = bound.def.count_attribute.as_ref().filter(|_| parent_alive) {
            ops.push(
                self.incr_count(parent_record.clone(), attr.clone(), -1)
                    .boxed(),
            );
        }
        if let Some(attr) = bound.def.current_attribute.as_ref().filter(|_| parent_alive) {
            ops.push(
                self.clear_current(parent_record.clone(), attr.clone())
                    .boxed(),
            );
        }
        for attr in &bound.def.sorted_sets {
            // Remove by member regardless of the child's present score;
            // the attribute may have gone absent since it was ranked.
            let key = keys::relation_sorted(&self.parent_ns, parent, rel, attr);
            ops.push(self.remove_ranked(key, member.clone()).boxed());
        }
        ops.push(
            self.remove_member(keys::relation(&self.parent_ns, parent, rel), member.clone())
                .boxed(),
        );

        fanout::all(ops).await?;
        debug!(ns = %self.parent_ns, %parent, rel, child = %child_id, "reference removed");

        if let Some(hook) = &bound.def.removed {
            hook.run(parent, child).await.map_err(ViewError::Hook)?;
        }
        Ok(())
    }

    // ── fan-out sub-operations ───────────────────────────────────

    async fn incr_count(&self, key: String, attr: String, delta: i64) -> ViewResult<()> {
        self.store.hash_incr_by(&key, &attr, delta).await?;
        Ok(())
    }

    async fn set_current(&self, key: String, attr: String, member: String) -> ViewResult<()> {
        self.store.hash_set(&key, &attr, &member).await?;
        Ok(())
    }

    async fn clear_current(&self, key: String, attr: String) -> ViewResult<()> {
        self.store.hash_delete(&key, &attr).await?;
        Ok(())
    }

    async fn add_ranked(&self, key: String, score: f64, member: String) -> ViewResult<()> {
        self.store.sorted_set_add(&key, score, &member).await?;
        Ok(())
    }

    async fn remove_ranked(&self, key: String, member: String) -> ViewResult<()> {
        self.store.sorted_set_remove(&key, &member).await?;
        Ok(())
    }

    async fn add_member(&self, key: String, member: String) -> ViewResult<()> {
        self.store.set_add(&key, &member).await?;
        Ok(())
    }

    async fn remove_member(&self, key: String, member: String) -> ViewResult<()> {
        self.store.set_remove(&key, &member).await?;
        Ok(())
    }

    // ── cascade ──────────────────────────────────────────────────

    /// Deletes every referenced child of each cascade relationship.
    /// Children cascade further through their own registries. Runs inside
    /// the parent's delete, after the parent record is gone and before
    /// its deletion is announced.
    pub(crate) async fn cascade(&self, parent: &Entity) -> ViewResult<()> {
        let Some(parent_id) = parent.id() else {
            return Ok(());
        };
        for bound in &self.relations {
            if bound.def.delete_rule != DeleteRule::Cascade {
                continue;
            }
            let members = self.member_ids_of(bound, parent_id).await?;
            if members.is_empty() {
                continue;
            }
            debug!(
                ns = %self.parent_ns,
                parent = %parent_id,
                rel = %bound.def.name,
                count = members.len(),
                "cascading delete"
            );
            fanout::all(members.iter().map(|&child_id| bound.child.del(child_id))).await?;
        }
        Ok(())
    }

    // ── reads ────────────────────────────────────────────────────

    /// Ids referenced under one parent.
    pub async fn member_ids(&self, parent: ObjectId, name: &str) -> ViewResult<Vec<ObjectId>> {
        let bound = self.relation(name)?;
        self.member_ids_of(bound, parent).await
    }

    /// Referenced children resolved through the child model, `None` for
    /// ids whose record is gone.
    pub async fn members(
        &self,
        parent: ObjectId,
        name: &str,
    ) -> ViewResult<Vec<Option<Entity>>> {
        let bound = self.relation(name)?;
        let ids = self.member_ids_of(bound, parent).await?;
        Ok(bound.child.read_many(&ids).await?)
    }

    /// A slice of one relationship sorted set, ascending by score, or
    /// descending when `rev`.
    pub async fn sorted_ids(
        &self,
        parent: ObjectId,
        name: &str,
        attr: &str,
        start: i64,
        end: i64,
        rev: bool,
    ) -> ViewResult<Vec<ObjectId>> {
        let bound = self.relation(name)?;
        if !bound.def.sorted_sets.iter().any(|a| a == attr) {
            return Err(ViewError::InvalidRelationship(format!(
                "'{name}' keeps no sorted set on '{attr}'"
            )));
        }
        let key = keys::relation_sorted(&self.parent_ns, parent, name, attr);
        let members = if rev {
            self.store.sorted_set_rev_range(&key, start, end).await?
        } else {
            self.store.sorted_set_range(&key, start, end).await?
        };
        Ok(self.parse_ids(members))
    }

    /// Like [`RelationRegistry::sorted_ids`] but resolved through the
    /// child model.
    pub async fn sorted_members(
        &self,
        parent: ObjectId,
        name: &str,
        attr: &str,
        start: i64,
        end: i64,
        rev: bool,
    ) -> ViewResult<Vec<Option<Entity>>> {
        let ids = self.sorted_ids(parent, name, attr, start, end, rev).await?;
        let bound = self.relation(name)?;
        Ok(bound.child.read_many(&ids).await?)
    }

    pub async fn member_exists(
        &self,
        parent: ObjectId,
        name: &str,
        child: ObjectId,
    ) -> ViewResult<bool> {
        let bound = self.relation(name)?;
        let key = keys::relation(&self.parent_ns, parent, &bound.def.name);
        Ok(self.store.set_is_member(&key, &child.to_string()).await?)
    }

    async fn member_ids_of(
        &self,
        bound: &BoundRelation,
        parent: ObjectId,
    ) -> ViewResult<Vec<ObjectId>> {
        let key = keys::relation(&self.parent_ns, parent, &bound.def.name);
        let members = self.store.set_members(&key).await?;
        Ok(self.parse_ids(members))
    }

    fn parse_ids(&self, members: Vec<String>) -> Vec<ObjectId> {
        members
            .into_iter()
            .filter_map(|raw| match ObjectId::from_str(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(ns = %self.parent_ns, raw, "malformed id in relationship set");
                    None
                }
            })
            .collect()
    }
}

/// Subscribed to a child model; forwards its lifecycle into one relation
/// of the registry.
pub(crate) struct RelationObserver {
    // Weak: the engine owns the registry strongly, and child models must
    // not keep their parents' registries alive.
    pub(crate) registry: Weak<RelationRegistry>,
    pub(crate) index: usize,
}

#[async_trait]
impl LifecycleObserver for RelationObserver {
    async fn created(&self, entity: &Entity) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        registry.child_created(self.index, entity).await?;
        Ok(())
    }

    async fn updated(&self, entity: &Entity, old: &Entity) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        registry.child_updated(self.index, entity, old).await?;
        Ok(())
    }

    async fn deleted(&self, entity: &Entity) -> anyhow::Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        registry.child_deleted(self.index, entity).await?;
        Ok(())
    }
}

/// Post-delete hook on the parent model delegating to the registry's
/// cascade. Bound after composition because the registry needs the
/// finished models first.
pub(crate) struct CascadeHook {
    registry: OnceLock<Weak<RelationRegistry>>,
}

impl CascadeHook {
    pub(crate) fn new() -> Self {
        Self {
            registry: OnceLock::new(),
        }
    }

    pub(crate) fn bind(&self, registry: &Arc<RelationRegistry>) {
        let _ = self.registry.set(Arc::downgrade(registry));
    }
}

#[async_trait]
impl EntityHook for CascadeHook {
    async fn run(&self, entity: &Entity) -> anyhow::Result<()> {
        let Some(registry) = self.registry.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        registry.cascade(entity).await?;
        Ok(())
    }
}
