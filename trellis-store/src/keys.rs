//! The hierarchical dotted key scheme.
//!
//! Every key the engine writes is composed here, so the addressing
//! convention lives in one place:
//!
//! ```text
//! <type>.new                          per-type id sequence
//! <type>.<id>                         object record (a hash of fields)
//! <type>.<name>                       named membership or scored set
//! <type>.created                      implicit created-scored history
//! <type>.<id>.<rel>                   relationship membership set
//! <type>.<id>.<rel>.sorted.<attr>     relationship sorted set
//! <type>.index.<attr>                 unique value -> id reverse lookup
//! <type>.stats.count|dailies|<attr>   stats facets
//! <parentType>.<parentId>.<name>      child-entity namespace
//! ```
//!
//! `<type>` may itself be a composite child namespace, which is how child
//! entities nest under their parent record.

use trellis_types::ObjectId;

/// Key of an object record.
#[must_use]
pub fn object(ns: &str, id: ObjectId) -> String {
    format!("{ns}.{id}")
}

/// Key of the per-type id sequence.
#[must_use]
pub fn sequence(ns: &str) -> String {
    format!("{ns}.new")
}

/// Key of a named set (including the implicit `all`).
#[must_use]
pub fn set(ns: &str, name: &str) -> String {
    format!("{ns}.{name}")
}

/// Key of the implicit created-scored history set.
#[must_use]
pub fn recent(ns: &str) -> String {
    format!("{ns}.created")
}

/// Key of a relationship's membership set on one parent.
#[must_use]
pub fn relation(ns: &str, parent: ObjectId, rel: &str) -> String {
    format!("{ns}.{parent}.{rel}")
}

/// Key of a relationship's per-attribute sorted set on one parent.
#[must_use]
pub fn relation_sorted(ns: &str, parent: ObjectId, rel: &str, attr: &str) -> String {
    format!("{ns}.{parent}.{rel}.sorted.{attr}")
}

/// Key of the unique reverse-lookup hash for one indexed attribute.
#[must_use]
pub fn index(ns: &str, attr: &str) -> String {
    format!("{ns}.index.{attr}")
}

/// Key of the total-count stat.
#[must_use]
pub fn stats_count(ns: &str) -> String {
    format!("{ns}.stats.count")
}

/// Key of the daily-histogram stat.
#[must_use]
pub fn stats_dailies(ns: &str) -> String {
    format!("{ns}.stats.dailies")
}

/// Key of one tracked attribute's value histogram.
#[must_use]
pub fn stats_attr(ns: &str, attr: &str) -> String {
    format!("{ns}.stats.{attr}")
}

/// Namespace under which one parent's child entities are stored.
#[must_use]
pub fn child_ns(parent_ns: &str, parent: ObjectId, name: &str) -> String {
    format!("{parent_ns}.{parent}.{name}")
}
