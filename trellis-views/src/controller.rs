//! Type composition and the engine surface.
//!
//! [`compose`] wires declared types into a running engine: each type gets
//! a model, its view maintainers subscribed to that model, and, where
//! relationships are declared, a registry subscribed to the child types'
//! models. Composition is where configuration errors surface; once an
//! [`Engine`] exists every declared name resolves.
//!
//! Event ordering per write: the model persists, the type's own views
//! (index, sets, stats) settle concurrently, and only then are outward
//! subscribers notified. Relationship registries listen on the child
//! model directly and therefore run alongside the child's own views.

use crate::error::{ViewError, ViewResult};
use crate::index::IndexMaintainer;
use crate::relations::{
    BoundRelation, CascadeHook, RelationDef, RelationObserver, RelationRegistry,
};
use crate::sets::{SetDef, SetMaintainer};
use crate::stats::{StatsAggregator, StatsReport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use trellis_model::{
    AttrDescriptor, AttrSchema, Entity, LifecycleObserver, Model, ObserverSet, Projection,
};
use trellis_store::Storage;
use trellis_types::{AttrType, AttrValue, Attributes, ObjectId};

/// Everything one entity type declares: schema, derived views, and
/// relationships to child types.
pub struct TypeDef {
    name: String,
    schema: AttrSchema,
    external_id: bool,
    public: Option<Projection>,
    private: Option<Projection>,
    indexes: Vec<String>,
    sets: Vec<SetDef>,
    tracked: Vec<String>,
    relationships: Vec<RelationDef>,
}

impl TypeDef {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: AttrSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            external_id: false,
            public: None,
            private: None,
            indexes: Vec::new(),
            sets: Vec::new(),
            tracked: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Unique reverse lookup on the named attribute.
    #[must_use]
    pub fn with_index(mut self, attr: impl Into<String>) -> Self {
        self.indexes.push(attr.into());
        self
    }

    #[must_use]
    pub fn with_set(mut self, set: SetDef) -> Self {
        self.sets.push(set);
        self
    }

    /// Adds the attribute to the stats value histograms.
    #[must_use]
    pub fn with_tracked(mut self, attr: impl Into<String>) -> Self {
        self.tracked.push(attr.into());
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, rel: RelationDef) -> Self {
        self.relationships.push(rel);
        self
    }

    #[must_use]
    pub fn with_public(mut self, projection: Projection) -> Self {
        self.public = Some(projection);
        self
    }

    #[must_use]
    pub fn with_private(mut self, projection: Projection) -> Self {
        self.private = Some(projection);
        self
    }

    /// Ids come from the caller instead of the namespace sequence.
    #[must_use]
    pub fn with_external_id(mut self) -> Self {
        self.external_id = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One type's view maintainers, subscribed to its model. Outward
/// subscribers hang off the binding and hear an event only after the
/// derived views for that event have settled.
pub(crate) struct ViewBinding {
    pub(crate) ns: String,
    pub(crate) index: IndexMaintainer,
    pub(crate) sets: SetMaintainer,
    pub(crate) stats: StatsAggregator,
    pub(crate) outward: ObserverSet,
}

#[async_trait]
impl LifecycleObserver for ViewBinding {
    async fn created(&self, entity: &Entity) -> anyhow::Result<()> {
        futures::try_join!(
            self.index.apply_created(entity),
            self.sets.apply_created(entity),
            self.stats.apply_created(entity),
        )?;
        self.outward.notify_created(&self.ns, entity).await;
        Ok(())
    }

    async fn updated(&self, entity: &Entity, old: &Entity) -> anyhow::Result<()> {
        futures::try_join!(
            self.index.apply_updated(entity, old),
            self.sets.apply_updated(entity, old),
            self.stats.apply_updated(entity, old),
        )?;
        self.outward.notify_updated(&self.ns, entity, old).await;
        Ok(())
    }

    async fn deleted(&self, entity: &Entity) -> anyhow::Result<()> {
        futures::try_join!(
            self.index.apply_deleted(entity),
            self.sets.apply_deleted(entity),
            self.stats.apply_deleted(entity),
        )?;
        self.outward.notify_deleted(&self.ns, entity).await;
        Ok(())
    }
}

struct EntityType {
    model: Arc<Model>,
    views: Arc<ViewBinding>,
    registry: Option<Arc<RelationRegistry>>,
}

/// The composed runtime: every declared type with its model, views and
/// relationship registries.
pub struct Engine {
    store: Arc<dyn Storage>,
    types: HashMap<String, EntityType>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.types.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("Engine")
            .field("types", &types)
            .finish_non_exhaustive()
    }
}

/// Builds an [`Engine`] from type declarations.
///
/// Relationship count and current attributes are injected into the
/// parent schema here, before the model freezes it; an explicit
/// declaration of the same attribute wins over injection.
pub fn compose(store: Arc<dyn Storage>, defs: Vec<TypeDef>) -> ViewResult<Engine> {
    // Injection first so cross-type checks see final schemas.
    let mut staged: Vec<TypeDef> = Vec::with_capacity(defs.len());
    for mut def in defs {
        if staged.iter().any(|d| d.name == def.name) {
            return Err(ViewError::Configuration(format!(
                "type '{}' declared twice",
                def.name
            )));
        }
        for (i, rel) in def.relationships.iter().enumerate() {
            if def.relationships[..i].iter().any(|r| r.name == rel.name) {
                return Err(ViewError::Configuration(format!(
                    "relationship '{}' declared twice on '{}'",
                    rel.name, def.name
                )));
            }
        }
        let mut schema = std::mem::take(&mut def.schema);
        for rel in &def.relationships {
            if let Some(attr) = &rel.count_attribute {
                schema = schema.with_attr_if_absent(
                    attr.clone(),
                    AttrDescriptor::new(AttrType::Num).required().with_default(0.0),
                );
            }
            if let Some(attr) = &rel.current_attribute {
                schema = schema.with_attr_if_absent(attr.clone(), AttrDescriptor::new(AttrType::Num));
            }
        }
        def.schema = schema;
        staged.push(def);
    }

    for def in &staged {
        for rel in &def.relationships {
            let Some(child) = staged.iter().find(|d| d.name == rel.child_type) else {
                return Err(ViewError::Configuration(format!(
                    "relationship '{}' on '{}' references unknown type '{}'",
                    rel.name, def.name, rel.child_type
                )));
            };
            if !child.schema.contains(&rel.parent_key) {
                return Err(ViewError::Configuration(format!(
                    "relationship '{}' on '{}': foreign key '{}' is not declared on '{}'",
                    rel.name, def.name, rel.parent_key, rel.child_type
                )));
            }
            for attr in &rel.sorted_sets {
                if !child.schema.contains(attr) {
                    return Err(ViewError::Configuration(format!(
                        "relationship '{}' on '{}': sorted attribute '{attr}' is not declared on '{}'",
                        rel.name, def.name, rel.child_type
                    )));
                }
            }
        }
    }

    let mut types: HashMap<String, EntityType> = HashMap::with_capacity(staged.len());
    let mut cascade_hooks: HashMap<String, Arc<CascadeHook>> = HashMap::new();
    let mut pending: Vec<(String, Vec<RelationDef>)> = Vec::new();

    for def in staged {
        let TypeDef {
            name,
            schema,
            external_id,
            public,
            private,
            indexes,
            sets,
            tracked,
            relationships,
        } = def;

        let mut model = Model::new(name.clone(), schema, store.clone());
        if let Some(projection) = public {
            model = model.with_public(projection);
        }
        if let Some(projection) = private {
            model = model.with_private(projection);
        }
        if external_id {
            model = model.with_external_id();
        }
        if !relationships.is_empty() {
            let hook = Arc::new(CascadeHook::new());
            model = model.with_post_delete(hook.clone());
            cascade_hooks.insert(name.clone(), hook);
        }
        let model = Arc::new(model);

        let binding = Arc::new(ViewBinding {
            ns: name.clone(),
            index: IndexMaintainer::new(name.clone(), indexes, model.schema(), store.clone())?,
            sets: SetMaintainer::new(name.clone(), sets, model.schema(), store.clone())?,
            stats: StatsAggregator::new(name.clone(), tracked, model.schema(), store.clone())?,
            outward: ObserverSet::new(),
        });
        model.subscribe(binding.clone());

        if !relationships.is_empty() {
            pending.push((name.clone(), relationships));
        }
        debug!(ns = %name, "type composed");
        types.insert(
            name,
            EntityType {
                model,
                views: binding,
                registry: None,
            },
        );
    }

    for (name, relationships) in pending {
        let mut bound = Vec::with_capacity(relationships.len());
        for rel in &relationships {
            let child = types
                .get(&rel.child_type)
                .map(|entry| entry.model.clone())
                .ok_or_else(|| ViewError::UnknownType(rel.child_type.clone()))?;
            bound.push(BoundRelation {
                def: rel.clone(),
                child,
            });
        }
        let registry = Arc::new(RelationRegistry::new(name.clone(), bound, store.clone()));
        if let Some(hook) = cascade_hooks.get(&name) {
            hook.bind(&registry);
        }
        for (index, rel) in relationships.iter().enumerate() {
            if let Some(child) = types.get(&rel.child_type) {
                child.model.subscribe(Arc::new(RelationObserver {
                    registry: Arc::downgrade(&registry),
                    index,
                }));
            }
        }
        if let Some(entry) = types.get_mut(&name) {
            entry.registry = Some(registry);
        }
    }

    Ok(Engine { store, types })
}

impl Engine {
    fn entry(&self, ns: &str) -> ViewResult<&EntityType> {
        self.types
            .get(ns)
            .ok_or_else(|| ViewError::UnknownType(ns.to_string()))
    }

    fn registry(&self, ns: &str) -> ViewResult<&Arc<RelationRegistry>> {
        self.entry(ns)?.registry.as_ref().ok_or_else(|| {
            ViewError::InvalidRelationship(format!("'{ns}' declares no relationships"))
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// The underlying model of a type, for callers that need the raw
    /// record surface.
    pub fn model(&self, ns: &str) -> ViewResult<&Arc<Model>> {
        Ok(&self.entry(ns)?.model)
    }

    /// Observes a type's lifecycle from outside. Subscribers hear events
    /// only after the derived views have settled for that event.
    pub fn subscribe(&self, ns: &str, observer: Arc<dyn LifecycleObserver>) -> ViewResult<()> {
        self.entry(ns)?.views.outward.push(observer);
        Ok(())
    }

    // ── record surface ───────────────────────────────────────────

    pub async fn create(&self, ns: &str, attrs: Attributes) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.create(attrs).await?)
    }

    pub async fn read(&self, ns: &str, id: ObjectId) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.read(id).await?)
    }

    pub async fn read_private(&self, ns: &str, id: ObjectId) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.read_private(id).await?)
    }

    pub async fn read_many(&self, ns: &str, ids: &[ObjectId]) -> ViewResult<Vec<Option<Entity>>> {
        Ok(self.entry(ns)?.model.read_many(ids).await?)
    }

    pub async fn update(&self, ns: &str, attrs: Attributes) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.update(attrs).await?)
    }

    /// Persists like [`Engine::update`] but skips every observer, so no
    /// derived view reacts. For writes the views themselves issue.
    pub async fn update_silent(&self, ns: &str, attrs: Attributes) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.update_silent(attrs).await?)
    }

    pub async fn del(&self, ns: &str, id: ObjectId) -> ViewResult<Entity> {
        Ok(self.entry(ns)?.model.del(id).await?)
    }

    pub async fn exists(&self, ns: &str, id: ObjectId) -> ViewResult<bool> {
        Ok(self.entry(ns)?.model.exists(id).await?)
    }

    /// Total ids ever issued for the type, deleted ones included.
    pub async fn count(&self, ns: &str) -> ViewResult<u64> {
        Ok(self.entry(ns)?.model.count().await?)
    }

    // ── index surface ────────────────────────────────────────────

    /// Resolves every indexed term present in `terms`; hits are read back
    /// as a batch, with `None` for records that vanished since indexing.
    pub async fn find(&self, ns: &str, terms: &Attributes) -> ViewResult<Vec<Option<Entity>>> {
        let entry = self.entry(ns)?;
        let ids = entry.views.index.find(terms).await?;
        Ok(entry.model.read_many(&ids).await?)
    }

    /// Shorthand lookup against the type's first declared index.
    pub async fn find_value(&self, ns: &str, value: &AttrValue) -> ViewResult<Vec<Option<Entity>>> {
        let entry = self.entry(ns)?;
        let Some(attr) = entry.views.index.attrs().first() else {
            return Err(ViewError::Configuration(format!(
                "no indexes declared on '{ns}'"
            )));
        };
        let ids = match entry.views.index.lookup(attr, value).await? {
            Some(id) => vec![id],
            None => Vec::new(),
        };
        Ok(entry.model.read_many(&ids).await?)
    }

    // ── set surface ──────────────────────────────────────────────

    pub async fn ids(&self, ns: &str, set: &str, start: i64, end: i64) -> ViewResult<Vec<ObjectId>> {
        self.entry(ns)?.views.sets.ids(set, start, end).await
    }

    /// A page of set members resolved through the model; ids whose record
    /// is gone degrade to `None` entries.
    pub async fn get(
        &self,
        ns: &str,
        set: &str,
        start: i64,
        end: i64,
    ) -> ViewResult<Vec<Option<Entity>>> {
        let entry = self.entry(ns)?;
        let ids = entry.views.sets.ids(set, start, end).await?;
        Ok(entry.model.read_many(&ids).await?)
    }

    /// The most recently created entities, newest first.
    pub async fn read_recent(&self, ns: &str, limit: usize) -> ViewResult<Vec<Option<Entity>>> {
        let entry = self.entry(ns)?;
        let ids = entry.views.sets.recent_ids(limit).await?;
        Ok(entry.model.read_many(&ids).await?)
    }

    // ── stats surface ────────────────────────────────────────────

    pub async fn report(&self, ns: &str) -> ViewResult<StatsReport> {
        self.entry(ns)?.views.stats.report().await
    }

    // ── relationship surface ─────────────────────────────────────

    pub async fn related_ids(
        &self,
        ns: &str,
        parent: ObjectId,
        rel: &str,
    ) -> ViewResult<Vec<ObjectId>> {
        self.registry(ns)?.member_ids(parent, rel).await
    }

    pub async fn related(
        &self,
        ns: &str,
        parent: ObjectId,
        rel: &str,
    ) -> ViewResult<Vec<Option<Entity>>> {
        self.registry(ns)?.members(parent, rel).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn related_sorted_ids(
        &self,
        ns: &str,
        parent: ObjectId,
        rel: &str,
        attr: &str,
        start: i64,
        end: i64,
        rev: bool,
    ) -> ViewResult<Vec<ObjectId>> {
        self.registry(ns)?
            .sorted_ids(parent, rel, attr, start, end, rev)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn related_sorted(
        &self,
        ns: &str,
        parent: ObjectId,
        rel: &str,
        attr: &str,
        start: i64,
        end: i64,
        rev: bool,
    ) -> ViewResult<Vec<Option<Entity>>> {
        self.registry(ns)?
            .sorted_members(parent, rel, attr, start, end, rev)
            .await
    }

    pub async fn related_exists(
        &self,
        ns: &str,
        parent: ObjectId,
        rel: &str,
        child: ObjectId,
    ) -> ViewResult<bool> {
        self.registry(ns)?.member_exists(parent, rel, child).await
    }
}
