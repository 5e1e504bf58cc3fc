//! Entity CRUD over a storage backend.
//!
//! Every write follows the same shape: validate, persist, run hooks,
//! notify observers, project for the caller. Observers finish before the
//! call returns; their failures are logged, never surfaced.

use crate::entity::{Entity, render_attrs};
use crate::error::{ModelError, ModelResult};
use crate::observer::{LifecycleObserver, ObserverSet};
use crate::schema::{AttrDescriptor, AttrSchema, ValidateMode};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use trellis_store::{Storage, fanout, keys};
use trellis_types::{AttrType, Attributes, ObjectId};

/// Reshapes an entity before it leaves the model. Identity unless a type
/// overrides it.
pub type Projection = Arc<dyn Fn(Entity) -> Entity + Send + Sync>;

/// Runs inside the write path, after the record has been persisted
/// (creates) or removed (deletes). Unlike observers, a failing hook fails
/// the call.
#[async_trait]
pub trait EntityHook: Send + Sync {
    async fn run(&self, entity: &Entity) -> anyhow::Result<()>;
}

/// Decides whether a delete may proceed.
#[async_trait]
pub trait DeleteGuard: Send + Sync {
    async fn permit(&self, id: ObjectId) -> anyhow::Result<bool>;
}

/// CRUD for one entity type.
///
/// Built once at composition, then shared behind an `Arc`. Hooks and
/// projections are fixed at build time; observers may be registered
/// afterwards via [`Model::subscribe`].
pub struct Model {
    name: String,
    schema: AttrSchema,
    store: Arc<dyn Storage>,
    observers: ObserverSet,
    public: Option<Projection>,
    private: Option<Projection>,
    post_create: Vec<Arc<dyn EntityHook>>,
    post_delete: Vec<Arc<dyn EntityHook>>,
    delete_guard: Option<Arc<dyn DeleteGuard>>,
    external_id: bool,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: AttrSchema, store: Arc<dyn Storage>) -> Self {
        Self {
            name: name.into(),
            schema,
            store,
            observers: ObserverSet::new(),
            public: None,
            private: None,
            post_create: Vec::new(),
            post_delete: Vec::new(),
            delete_guard: None,
            external_id: false,
        }
    }

    /// Projection applied to everything returned to callers.
    #[must_use]
    pub fn with_public(mut self, projection: Projection) -> Self {
        self.public = Some(projection);
        self
    }

    /// Projection applied to event payloads. Observers may therefore see
    /// fields the public surface redacts.
    #[must_use]
    pub fn with_private(mut self, projection: Projection) -> Self {
        self.private = Some(projection);
        self
    }

    #[must_use]
    pub fn with_post_create(mut self, hook: Arc<dyn EntityHook>) -> Self {
        self.post_create.push(hook);
        self
    }

    #[must_use]
    pub fn with_post_delete(mut self, hook: Arc<dyn EntityHook>) -> Self {
        self.post_delete.push(hook);
        self
    }

    #[must_use]
    pub fn with_delete_guard(mut self, guard: Arc<dyn DeleteGuard>) -> Self {
        self.delete_guard = Some(guard);
        self
    }

    /// Callers supply ids instead of the namespace sequence. Makes `id`
    /// required on create; uniqueness stays the caller's responsibility.
    #[must_use]
    pub fn with_external_id(mut self) -> Self {
        self.external_id = true;
        let schema = std::mem::take(&mut self.schema);
        let id_desc = schema
            .get("id")
            .cloned()
            .unwrap_or_else(|| AttrDescriptor::new(AttrType::Num))
            .required();
        self.schema = schema.with_attr("id", id_desc);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> &AttrSchema {
        &self.schema
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    /// Creates an entity. Hooks run after the record is persisted and may
    /// fail the call; observers are then notified with the private
    /// snapshot. Returns the public snapshot.
    pub async fn create(&self, attrs: Attributes) -> ModelResult<Entity> {
        let attrs = self.schema.validate(attrs, ValidateMode::Create)?;
        let record = if self.external_id {
            let id = extract_id(&attrs)?;
            self.store
                .create_object_with_id(&self.name, id, render_attrs(&attrs))
                .await?
        } else {
            self.store.create_object(&self.name, render_attrs(&attrs)).await?
        };
        let entity = Entity::from_stored(&self.schema, record);
        debug!(ns = %self.name, id = ?entity.id(), "created entity");

        for hook in &self.post_create {
            hook.run(&entity).await.map_err(ModelError::Hook)?;
        }
        let private = self.project_private(entity.clone());
        self.observers.notify_created(&self.name, &private).await;
        Ok(self.project_public(entity))
    }

    /// Reads an entity, applying the public projection.
    pub async fn read(&self, id: ObjectId) -> ModelResult<Entity> {
        let entity = self.fetch(id).await?;
        Ok(self.project_public(entity))
    }

    /// Reads an entity with the event-payload projection applied.
    pub async fn read_private(&self, id: ObjectId) -> ModelResult<Entity> {
        let entity = self.fetch(id).await?;
        Ok(self.project_private(entity))
    }

    /// Batch read preserving order. Absent ids become `None` slots; a
    /// storage failure aborts the whole batch.
    pub async fn read_many(&self, ids: &[ObjectId]) -> ModelResult<Vec<Option<Entity>>> {
        let slots = fanout::all(ids.iter().map(|&id| self.fetch_optional(id))).await?;
        Ok(slots
            .into_iter()
            .map(|slot| slot.map(|entity| self.project_public(entity)))
            .collect())
    }

    /// Updates an entity. `attrs` must carry `id`; the rest merges onto
    /// the stored record. Observers receive both the post-write and
    /// pre-write private snapshots. Returns the public post-write
    /// snapshot.
    pub async fn update(&self, attrs: Attributes) -> ModelResult<Entity> {
        self.update_inner(attrs, false).await
    }

    /// Like [`Model::update`] but skips observer notification, leaving
    /// derived views untouched. For writes the views themselves make.
    pub async fn update_silent(&self, attrs: Attributes) -> ModelResult<Entity> {
        self.update_inner(attrs, true).await
    }

    async fn update_inner(&self, attrs: Attributes, silent: bool) -> ModelResult<Entity> {
        let attrs = self.schema.validate(attrs, ValidateMode::Update)?;
        let id = extract_id(&attrs)?;
        let old = self.fetch(id).await?;
        self.store
            .update_object(&self.name, id, render_attrs(&attrs))
            .await?;
        let entity = self.fetch(id).await?;
        debug!(ns = %self.name, %id, silent, "updated entity");

        if !silent {
            let new_private = self.project_private(entity.clone());
            let old_private = self.project_private(old);
            self.observers
                .notify_updated(&self.name, &new_private, &old_private)
                .await;
        }
        Ok(self.project_public(entity))
    }

    /// Deletes an entity: guard, snapshot, delete, hooks, notify. The
    /// snapshot is read before the delete so observers and the caller see
    /// the final state of the record. Returns the public snapshot.
    pub async fn del(&self, id: ObjectId) -> ModelResult<Entity> {
        if let Some(guard) = &self.delete_guard {
            let permitted = guard.permit(id).await.map_err(ModelError::Hook)?;
            if !permitted {
                return Err(ModelError::DeleteDenied {
                    ns: self.name.clone(),
                    id,
                });
            }
        }
        let entity = self.fetch(id).await?;
        self.store.delete_object(&self.name, id).await?;
        debug!(ns = %self.name, %id, "deleted entity");

        for hook in &self.post_delete {
            hook.run(&entity).await.map_err(ModelError::Hook)?;
        }
        let private = self.project_private(entity.clone());
        self.observers.notify_deleted(&self.name, &private).await;
        Ok(self.project_public(entity))
    }

    pub async fn exists(&self, id: ObjectId) -> ModelResult<bool> {
        Ok(self.store.object_exists(&self.name, id).await?)
    }

    /// Highest id handed out by the namespace sequence. Zero before the
    /// first create; external-id types never advance it.
    pub async fn count(&self) -> ModelResult<u64> {
        let raw = self.store.get(&keys::sequence(&self.name)).await?;
        Ok(raw.and_then(|raw| raw.parse().ok()).unwrap_or(0))
    }

    async fn fetch(&self, id: ObjectId) -> ModelResult<Entity> {
        let record = self
            .store
            .read_object(&self.name, id)
            .await?
            .ok_or_else(|| ModelError::NotFound {
                ns: self.name.clone(),
                id,
            })?;
        Ok(Entity::from_stored(&self.schema, record))
    }

    async fn fetch_optional(&self, id: ObjectId) -> ModelResult<Option<Entity>> {
        let record = self.store.read_object(&self.name, id).await?;
        Ok(record.map(|record| Entity::from_stored(&self.schema, record)))
    }

    pub(crate) fn project_public(&self, entity: Entity) -> Entity {
        match &self.public {
            Some(projection) => projection(entity),
            None => entity,
        }
    }

    pub(crate) fn project_private(&self, entity: Entity) -> Entity {
        match &self.private {
            Some(projection) => projection(entity),
            None => entity,
        }
    }
}

/// Pulls the identifying id out of validated attributes.
pub(crate) fn extract_id(attrs: &Attributes) -> ModelResult<ObjectId> {
    let value = attrs
        .get("id")
        .ok_or(ModelError::IdentityRequired { what: "id" })?;
    value
        .as_num()
        .and_then(ObjectId::from_num)
        .ok_or_else(|| ModelError::InvalidId {
            raw: value.render(),
        })
}
