//! Derived views for trellis.
//!
//! Everything here reacts to entity lifecycle events and keeps a
//! denormalized structure in step with the primary records: unique
//! reverse-lookup indexes, plain and score-ordered membership sets,
//! parent→child reference registries with counters and delete rules, and
//! running stats aggregates.
//!
//! [`compose`] wires declared [`TypeDef`]s into an [`Engine`], the single
//! handle a caller needs: record CRUD, `find` through indexes, set pages,
//! relationship reads and stats reports all hang off it.
//!
//! Consistency is eventual. Each event's multi-key fan-out is joined
//! before the next layer hears about it, but there is no transaction
//! spanning the writes; a crash mid-fan-out leaves views stale until the
//! entity is written again.

mod controller;
mod error;
mod index;
mod relations;
mod sets;
mod stats;

pub use controller::{Engine, TypeDef, compose};
pub use error::{ViewError, ViewResult};
pub use relations::{DeleteRule, RelationDef, RelationFilter, RelationHook};
pub use sets::{SetDef, SetPredicate};
pub use stats::StatsReport;
