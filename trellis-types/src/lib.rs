//! Core type definitions for trellis.
//!
//! This crate defines the fundamental types shared by every layer of the
//! engine:
//! - Attribute values and their declared types, with the coercion rules the
//!   validator and the storage boundary both rely on
//! - Entity object identifiers (storage-assigned integer sequences)
//!
//! Entity schemas, records, and the derived-view machinery live in the
//! higher crates; nothing here touches storage.

mod ids;
mod value;

pub use ids::ObjectId;
pub use value::{AttrType, AttrValue, Attributes};
