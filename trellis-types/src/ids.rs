//! Identifier types used throughout the trellis core.
//!
//! Object ids are small integers handed out by the storage layer's per-type
//! sequence, not UUIDs; they double as sorted-set members and hash fields in
//! their decimal string form.

use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Largest integer a double represents exactly; ids beyond this would not
/// survive the numeric attribute round-trip.
const MAX_SAFE_ID: f64 = 9_007_199_254_740_992.0;

/// Unique identifier of a stored entity within its type's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Creates an object id from a raw integer.
    #[must_use]
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Converts a numeric attribute value to an id.
    ///
    /// Ids live in records as `number` attributes; only non-negative
    /// integral values in the exactly-representable range qualify.
    #[must_use]
    pub fn from_num(n: f64) -> Option<Self> {
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= MAX_SAFE_ID {
            Some(Self(n as u64))
        } else {
            None
        }
    }

    /// Returns the id as a numeric attribute value.
    #[must_use]
    pub const fn as_num(&self) -> f64 {
        self.0 as f64
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ObjectId> for AttrValue {
    fn from(id: ObjectId) -> Self {
        AttrValue::Num(id.as_num())
    }
}
