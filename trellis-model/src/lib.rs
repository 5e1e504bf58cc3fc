//! Entity records for trellis.
//!
//! An entity type is a name plus an immutable [`AttrSchema`]; a [`Model`]
//! owns the CRUD lifecycle of all records of that type:
//!
//! ```text
//! validate -> persist -> hooks -> notify observers -> project
//! ```
//!
//! Every mutation fans out to registered [`LifecycleObserver`]s before it
//! returns, which is how the derived-view layer stays in step with the
//! primary records. Observers never fail a mutation; hooks and guards can.
//!
//! [`ChildModel`] is the hierarchical variant: records namespaced under a
//! parent record, with parent existence asserted on create.

mod child;
mod entity;
mod error;
mod model;
mod observer;
mod schema;

pub use child::{ChildModel, ParentRef};
pub use entity::Entity;
pub use error::{ModelError, ModelResult};
pub use model::{DeleteGuard, EntityHook, Model, Projection};
pub use observer::{LifecycleObserver, ObserverSet};
pub use schema::{AttrDescriptor, AttrSchema, ValidateMode};

/// Attribute names every schema declares implicitly.
pub const IMPLICIT_ATTRS: [&str; 3] = ["id", "created", "updated"];
