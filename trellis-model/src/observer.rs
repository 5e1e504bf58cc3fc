//! Lifecycle observation.
//!
//! Observers hear about every create, update, and delete after the write
//! has landed. They run to completion before the triggering call returns,
//! so a caller that sees `Ok` knows derived state has been maintained.
//! Observer failures are logged and never fail the write itself.

use crate::entity::Entity;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::warn;
use trellis_store::fanout;

/// Hears entity lifecycle events. All methods default to no-ops; implement
/// only the ones you care about.
///
/// `created` and `deleted` receive the full (private) entity. `updated`
/// receives the entity after the write and the snapshot read immediately
/// before it, so implementations can diff the two.
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    async fn created(&self, entity: &Entity) -> anyhow::Result<()> {
        let _ = entity;
        Ok(())
    }

    async fn updated(&self, entity: &Entity, old: &Entity) -> anyhow::Result<()> {
        let _ = (entity, old);
        Ok(())
    }

    async fn deleted(&self, entity: &Entity) -> anyhow::Result<()> {
        let _ = entity;
        Ok(())
    }
}

/// A registry of lifecycle observers.
///
/// Registration happens after the owning type is wrapped in `Arc`, so the
/// list lives behind its own lock. The lock is never held across an
/// await: notification snapshots the list first, then fans out. Every
/// observer runs to completion; failures are logged under the given
/// namespace and swallowed.
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn LifecycleObserver>>>,
}

impl ObserverSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn push(&self, observer: Arc<dyn LifecycleObserver>) {
        let mut guard = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(observer);
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleObserver>> {
        let guard = match self.observers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    pub async fn notify_created(&self, ns: &str, entity: &Entity) {
        let observers = self.snapshot();
        let outcomes =
            fanout::settled(observers.iter().map(|obs| obs.created(entity))).await;
        log_failures(ns, "created", &outcomes);
    }

    pub async fn notify_updated(&self, ns: &str, entity: &Entity, old: &Entity) {
        let observers = self.snapshot();
        let outcomes =
            fanout::settled(observers.iter().map(|obs| obs.updated(entity, old))).await;
        log_failures(ns, "updated", &outcomes);
    }

    pub async fn notify_deleted(&self, ns: &str, entity: &Entity) {
        let observers = self.snapshot();
        let outcomes =
            fanout::settled(observers.iter().map(|obs| obs.deleted(entity))).await;
        log_failures(ns, "deleted", &outcomes);
    }
}

fn log_failures(ns: &str, event: &str, outcomes: &[anyhow::Result<()>]) {
    for outcome in outcomes {
        if let Err(err) = outcome {
            warn!(ns, event, error = %err, "lifecycle observer failed");
        }
    }
}
