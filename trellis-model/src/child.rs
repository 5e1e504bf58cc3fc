//! Hierarchical entities stored under a parent's namespace.
//!
//! A child record lives at `<parentNs>.<parentId>.<childName>.<id>`, so
//! every read and write needs the parent's identity alongside the child
//! id. The parent identity travels inside the attributes as the required
//! private attributes `parentModel` and `parentId`.

use crate::entity::{Entity, render_attrs};
use crate::error::{ModelError, ModelResult};
use crate::model::{Projection, extract_id};
use crate::observer::{LifecycleObserver, ObserverSet};
use crate::schema::{AttrDescriptor, AttrSchema, ValidateMode};
use std::sync::Arc;
use tracing::debug;
use trellis_store::{Storage, fanout, keys};
use trellis_types::{AttrType, AttrValue, Attributes, ObjectId};

/// Identity of the namespace a child record hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub ns: String,
    pub id: ObjectId,
}

impl ParentRef {
    #[must_use]
    pub fn new(ns: impl Into<String>, id: ObjectId) -> Self {
        Self { ns: ns.into(), id }
    }
}

/// CRUD for an entity type scoped under parent records.
///
/// Mirrors [`crate::Model`] but addresses storage through the composed
/// child namespace and refuses creates whose parent record is absent.
pub struct ChildModel {
    name: String,
    schema: AttrSchema,
    store: Arc<dyn Storage>,
    observers: ObserverSet,
    public: Option<Projection>,
    private: Option<Projection>,
    external_id: bool,
}

impl ChildModel {
    /// `parentModel` and `parentId` are declared on every child schema,
    /// required and private.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: AttrSchema, store: Arc<dyn Storage>) -> Self {
        let schema = schema
            .with_attr(
                "parentModel",
                AttrDescriptor::new(AttrType::Str).required().private(),
            )
            .with_attr(
                "parentId",
                AttrDescriptor::new(AttrType::Num).required().private(),
            );
        Self {
            name: name.into(),
            schema,
            store,
            observers: ObserverSet::new(),
            public: None,
            private: None,
            external_id: false,
        }
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

    /// Callers supply ids instead of the per-parent sequence; `id`
    /// becomes required on create.
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

    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    /// The storage namespace for this type under one parent.
    #[must_use]
    pub fn ns_for(&self, parent: &ParentRef) -> String {
        keys::child_ns(&parent.ns, parent.id, &self.name)
    }

    /// Creates a child record. The parent named by `parentModel` and
    /// `parentId` must exist.
    pub async fn create(&self, attrs: Attributes) -> ModelResult<Entity> {
        let attrs = self.schema.validate(attrs, ValidateMode::Create)?;
        let parent = extract_parent(&attrs)?;
        if !self.parent_exists(&parent).await? {
            return Err(ModelError::ParentMissing {
                ns: parent.ns,
                id: parent.id,
            });
        }
        let ns = self.ns_for(&parent);
        let record = if self.external_id {
            let id = extract_id(&attrs)?;
            self.store
                .create_object_with_id(&ns, id, render_attrs(&attrs))
                .await?
        } else {
            self.store.create_object(&ns, render_attrs(&attrs)).await?
        };
        let entity = Entity::from_stored(&self.schema, record);
        debug!(%ns, id = ?entity.id(), "created child entity");

        let private = self.project_private(entity.clone());
        self.observers.notify_created(&ns, &private).await;
        Ok(self.project_public(entity))
    }

    pub async fn read(&self, parent: &ParentRef, id: ObjectId) -> ModelResult<Entity> {
        let entity = self.fetch(parent, id).await?;
        Ok(self.project_public(entity))
    }

    pub async fn read_private(&self, parent: &ParentRef, id: ObjectId) -> ModelResult<Entity> {
        let entity = self.fetch(parent, id).await?;
        Ok(self.project_private(entity))
    }

    /// Batch read under one parent, preserving order; absent ids become
    /// `None` slots.
    pub async fn read_many(
        &self,
        parent: &ParentRef,
        ids: &[ObjectId],
    ) -> ModelResult<Vec<Option<Entity>>> {
        let slots = fanout::all(ids.iter().map(|&id| self.fetch_optional(parent, id))).await?;
        Ok(slots
            .into_iter()
            .map(|slot| slot.map(|entity| self.project_public(entity)))
            .collect())
    }

    /// Updates a child record. `attrs` must carry `id`, `parentModel`,
    /// and `parentId`.
    pub async fn update(&self, attrs: Attributes) -> ModelResult<Entity> {
        let attrs = self.schema.validate(attrs, ValidateMode::Update)?;
        let parent = extract_parent(&attrs)?;
        let id = extract_id(&attrs)?;
        let ns = self.ns_for(&parent);
        let old = self.fetch(&parent, id).await?;
        self.store.update_object(&ns, id, render_attrs(&attrs)).await?;
        let entity = self.fetch(&parent, id).await?;
        debug!(%ns, %id, "updated child entity");

        let new_private = self.project_private(entity.clone());
        let old_private = self.project_private(old);
        self.observers
            .notify_updated(&ns, &new_private, &old_private)
            .await;
        Ok(self.project_public(entity))
    }

    /// Deletes a child record, notifying observers with the pre-delete
    /// snapshot.
    pub async fn del(&self, parent: &ParentRef, id: ObjectId) -> ModelResult<Entity> {
        let ns = self.ns_for(parent);
        let entity = self.fetch(parent, id).await?;
        self.store.delete_object(&ns, id).await?;
        debug!(%ns, %id, "deleted child entity");

        let private = self.project_private(entity.clone());
        self.observers.notify_deleted(&ns, &private).await;
        Ok(self.project_public(entity))
    }

    pub async fn exists(&self, parent: &ParentRef, id: ObjectId) -> ModelResult<bool> {
        Ok(self.store.object_exists(&self.ns_for(parent), id).await?)
    }

    pub async fn parent_exists(&self, parent: &ParentRef) -> ModelResult<bool> {
        Ok(self.store.object_exists(&parent.ns, parent.id).await?)
    }

    async fn fetch(&self, parent: &ParentRef, id: ObjectId) -> ModelResult<Entity> {
        let ns = self.ns_for(parent);
        let record = self
            .store
            .read_object(&ns, id)
            .await?
            .ok_or_else(|| ModelError::NotFound { ns, id })?;
        Ok(Entity::from_stored(&self.schema, record))
    }

    async fn fetch_optional(
        &self,
        parent: &ParentRef,
        id: ObjectId,
    ) -> ModelResult<Option<Entity>> {
        let record = self.store.read_object(&self.ns_for(parent), id).await?;
        Ok(record.map(|record| Entity::from_stored(&self.schema, record)))
    }

    fn project_public(&self, entity: Entity) -> Entity {
        match &self.public {
            Some(projection) => projection(entity),
            None => entity,
        }
    }

    fn project_private(&self, entity: Entity) -> Entity {
        match &self.private {
            Some(projection) => projection(entity),
            None => entity,
        }
    }
}

/// Pulls the parent identity out of validated attributes.
fn extract_parent(attrs: &Attributes) -> ModelResult<ParentRef> {
    let ns = attrs
        .get("parentModel")
        .and_then(AttrValue::as_str)
        .ok_or(ModelError::IdentityRequired {
            what: "parentModel",
        })?;
    let id_value = attrs
        .get("parentId")
        .ok_or(ModelError::IdentityRequired { what: "parentId" })?;
    let id = id_value
        .as_num()
        .and_then(ObjectId::from_num)
        .ok_or_else(|| ModelError::InvalidId {
            raw: id_value.render(),
        })?;
    Ok(ParentRef::new(ns, id))
}
