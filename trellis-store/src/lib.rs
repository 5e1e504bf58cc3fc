//! Key-value storage abstraction for the trellis engine.
//!
//! Everything above this crate talks to storage through the [`Storage`]
//! trait: namespaced object records plus the small-structure verbs (sets,
//! sorted sets, hashes, counters) the derived views are built from. All
//! values cross the boundary as strings; typed coercion belongs to the
//! model layer.
//!
//! The crate also owns the two pieces of plumbing every consumer shares:
//! - [`keys`]: the hierarchical dotted key scheme
//!   (`"<type>.<id>.<relationshipOrSetName>[.<subkey>]"`)
//! - [`fanout`]: the structured fan-out/fan-in join used to run the
//!   multi-key side effects of one lifecycle event concurrently
//!
//! [`MemoryStore`] is a complete in-process backend used by tests and
//! embeddings; nothing in the engine assumes more than the trait.

pub mod fanout;
pub mod keys;

mod client;
mod error;
mod memory;

pub use client::{Storage, StoredRecord};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
