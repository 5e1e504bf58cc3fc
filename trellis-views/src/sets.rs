//! Ordered and conditional membership sets.
//!
//! Two declared kinds: score-ordered sets ranked by a numeric attribute,
//! and conditional plain sets gated by an attribute equality test or a
//! predicate closure. Every type additionally maintains the implicit
//! `all` plain set and a creation-time history ranked at `<ns>.created`,
//! which backs recent-first reads.

use crate::error::{ViewError, ViewResult};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use trellis_model::{AttrSchema, Entity};
use trellis_store::{Storage, fanout, keys};
use trellis_types::{AttrValue, ObjectId};

const ALL_SET: &str = "all";
const RECENT_SET: &str = "created";

/// Membership gate evaluated against an entity snapshot.
pub type SetPredicate = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

#[derive(Clone)]
pub(crate) enum SetKind {
    Scored { score_attr: String },
    Conditional { attr: String, equals: AttrValue },
    Predicate { predicate: SetPredicate },
}

/// Declares one named set on an entity type.
#[derive(Clone)]
pub struct SetDef {
    pub(crate) name: String,
    pub(crate) kind: SetKind,
}

impl SetDef {
    /// A set ranked by a numeric attribute's value. Entities without the
    /// attribute stay out.
    #[must_use]
    pub fn scored(name: impl Into<String>, score_attr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SetKind::Scored {
                score_attr: score_attr.into(),
            },
        }
    }

    /// A plain set whose membership is gated on an attribute equaling a
    /// value.
    #[must_use]
    pub fn conditional(
        name: impl Into<String>,
        attr: impl Into<String>,
        equals: impl Into<AttrValue>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SetKind::Conditional {
                attr: attr.into(),
                equals: equals.into(),
            },
        }
    }

    /// A plain set whose membership is gated on a predicate closure.
    #[must_use]
    pub fn predicate(
        name: impl Into<String>,
        predicate: impl Fn(&Entity) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SetKind::Predicate {
                predicate: Arc::new(predicate),
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Maintains the declared and implicit sets for one entity type.
pub struct SetMaintainer {
    ns: String,
    sets: Vec<SetDef>,
    store: Arc<dyn Storage>,
}

impl SetMaintainer {
    pub(crate) fn new(
        ns: String,
        sets: Vec<SetDef>,
        schema: &AttrSchema,
        store: Arc<dyn Storage>,
    ) -> ViewResult<Self> {
        for (i, def) in sets.iter().enumerate() {
            if def.name == ALL_SET || def.name == RECENT_SET {
                return Err(ViewError::Configuration(format!(
                    "set name '{}' is reserved on '{ns}'",
                    def.name
                )));
            }
            if sets[..i].iter().any(|other| other.name == def.name) {
                return Err(ViewError::Configuration(format!(
                    "set '{}' declared twice on '{ns}'",
                    def.name
                )));
            }
            let gating_attr = match &def.kind {
                SetKind::Scored { score_attr } => Some(score_attr),
                SetKind::Conditional { attr, .. } => Some(attr),
                SetKind::Predicate { .. } => None,
            };
            if let Some(attr) = gating_attr {
                if !schema.contains(attr) {
                    return Err(ViewError::Configuration(format!(
                        "set '{}' uses attribute '{attr}' not declared on '{ns}'",
                        def.name
                    )));
                }
            }
        }
        Ok(Self { ns, sets, store })
    }

    pub(crate) async fn apply_created(&self, entity: &Entity) -> ViewResult<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        let member = id.to_string();
        let member = member.as_str();
        futures::try_join!(
            self.add_implicit(entity, member),
            fanout::all(self.sets.iter().map(|def| self.add_to(def, entity, member))),
        )?;
        Ok(())
    }

    /// Membership is recomputed from snapshots: out of whatever the old
    /// snapshot satisfied, into whatever the new one satisfies. One update
    /// can move an entity between two mutually exclusive sets.
    pub(crate) async fn apply_updated(&self, entity: &Entity, old: &Entity) -> ViewResult<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        let member = id.to_string();
        let member = member.as_str();
        fanout::all(self.sets.iter().map(|def| async move {
            self.remove_from(def, old, member).await?;
            self.add_to(def, entity, member).await
        }))
        .await?;
        Ok(())
    }

    pub(crate) async fn apply_deleted(&self, entity: &Entity) -> ViewResult<()> {
        let Some(id) = entity.id() else {
            return Ok(());
        };
        let member = id.to_string();
        let member = member.as_str();
        futures::try_join!(
            self.remove_implicit(member),
            fanout::all(
                self.sets
                    .iter()
                    .map(|def| self.remove_from(def, entity, member))
            ),
        )?;
        Ok(())
    }

    async fn add_implicit(&self, entity: &Entity, member: &str) -> ViewResult<()> {
        self.store
            .set_add(&keys::set(&self.ns, ALL_SET), member)
            .await?;
        if let Some(created) = entity.created() {
            self.store
                .sorted_set_add(&keys::recent(&self.ns), created as f64, member)
                .await?;
        }
        Ok(())
    }

    async fn remove_implicit(&self, member: &str) -> ViewResult<()> {
        self.store
            .set_remove(&keys::set(&self.ns, ALL_SET), member)
            .await?;
        self.store
            .sorted_set_remove(&keys::recent(&self.ns), member)
            .await?;
        Ok(())
    }

    async fn add_to(&self, def: &SetDef, entity: &Entity, member: &str) -> ViewResult<()> {
        let key = keys::set(&self.ns, &def.name);
        match &def.kind {
            SetKind::Scored { score_attr } => {
                if let Some(score) = entity.get_number(score_attr) {
                    self.store.sorted_set_add(&key, score, member).await?;
                }
            }
            SetKind::Conditional { attr, equals } => {
                if entity.get(attr) == Some(equals) {
                    self.store.set_add(&key, member).await?;
                }
            }
            SetKind::Predicate { predicate } => {
                if predicate(entity) {
                    self.store.set_add(&key, member).await?;
                }
            }
        }
        Ok(())
    }

    async fn remove_from(&self, def: &SetDef, entity: &Entity, member: &str) -> ViewResult<()> {
        let key = keys::set(&self.ns, &def.name);
        match &def.kind {
            // Removal by member, whatever the score was; covers entities
            // whose score attribute has since gone absent.
            SetKind::Scored { .. } => self.store.sorted_set_remove(&key, member).await?,
            SetKind::Conditional { attr, equals } => {
                if entity.get(attr) == Some(equals) {
                    self.store.set_remove(&key, member).await?;
                }
            }
            SetKind::Predicate { predicate } => {
                if predicate(entity) {
                    self.store.set_remove(&key, member).await?;
                }
            }
        }
        Ok(())
    }

    /// A page of member ids. Plain sets (and the implicit `all`) return
    /// their full membership; score-ordered sets return the inclusive
    /// `start..end` slice in ascending score order.
    pub async fn ids(&self, name: &str, start: i64, end: i64) -> ViewResult<Vec<ObjectId>> {
        if name == ALL_SET {
            let members = self.store.set_members(&keys::set(&self.ns, ALL_SET)).await?;
            return Ok(self.parse_ids(members));
        }
        let Some(def) = self.sets.iter().find(|def| def.name == name) else {
            return Err(ViewError::InvalidSet(name.to_string()));
        };
        let key = keys::set(&self.ns, name);
        let members = match &def.kind {
            SetKind::Scored { .. } => self.store.sorted_set_range(&key, start, end).await?,
            SetKind::Conditional { .. } | SetKind::Predicate { .. } => {
                self.store.set_members(&key).await?
            }
        };
        Ok(self.parse_ids(members))
    }

    /// Most recently created ids, newest first.
    pub async fn recent_ids(&self, limit: usize) -> ViewResult<Vec<ObjectId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let members = self
            .store
            .sorted_set_rev_range(&keys::recent(&self.ns), 0, limit as i64 - 1)
            .await?;
        Ok(self.parse_ids(members))
    }

    fn parse_ids(&self, members: Vec<String>) -> Vec<ObjectId> {
        members
            .into_iter()
            .filter_map(|raw| match ObjectId::from_str(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(ns = %self.ns, raw, "malformed id in set membership");
                    None
                }
            })
            .collect()
    }
}
