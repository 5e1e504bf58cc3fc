//! Attribute values and their declared types.
//!
//! The storage layer persists every field as a string; `AttrValue` is the
//! typed in-memory form. `render` and `from_stored` are the two directions
//! of that boundary, and `coerce_to` is the validator's lenient conversion
//! ladder for caller-supplied input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An entity's attributes, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Declared type of an entity attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    /// UTF-8 text.
    Str,
    /// Double-precision float; integral values render without a fraction.
    Num,
    /// `true` / `false`.
    Bool,
    /// Arbitrary JSON, persisted as its compact string form.
    Object,
}

impl AttrType {
    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            AttrType::Str => "string",
            AttrType::Num => "number",
            AttrType::Bool => "boolean",
            AttrType::Object => "object",
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Object(serde_json::Value),
}

impl AttrValue {
    /// The runtime type of this value.
    #[must_use]
    pub const fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Str(_) => AttrType::Str,
            AttrValue::Num(_) => AttrType::Num,
            AttrValue::Bool(_) => AttrType::Bool,
            AttrValue::Object(_) => AttrType::Object,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_num(&self) -> Option<f64> {
        match self {
            AttrValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&serde_json::Value> {
        match self {
            AttrValue::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to convert this value to the declared type.
    ///
    /// Matching values pass through untouched. A mismatched string may step
    /// to a boolean (`"true"` / `"false"`) or to a finite number; every
    /// other mismatch yields `None` and the caller drops the attribute.
    /// `NaN` and infinities never survive.
    #[must_use]
    pub fn coerce_to(self, ty: AttrType) -> Option<AttrValue> {
        if self.attr_type() == ty {
            return Some(self);
        }
        let stepped = match &self {
            AttrValue::Str(s) => match s.as_str() {
                "true" => Some(AttrValue::Bool(true)),
                "false" => Some(AttrValue::Bool(false)),
                other => other
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(AttrValue::Num),
            },
            _ => None,
        };
        stepped.filter(|v| v.attr_type() == ty)
    }

    /// Renders the value in its stored string form.
    ///
    /// Integral numbers render without a fractional part so that ids and
    /// counters round-trip as plain decimal strings.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Num(n) => render_num(*n),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Object(v) => v.to_string(),
        }
    }

    /// Parses a stored string back into a typed value.
    ///
    /// Returns `None` when the stored form does not parse as the declared
    /// type; readers skip such fields rather than failing the record.
    #[must_use]
    pub fn from_stored(ty: AttrType, raw: &str) -> Option<AttrValue> {
        match ty {
            AttrType::Str => Some(AttrValue::Str(raw.to_string())),
            AttrType::Num => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(AttrValue::Num),
            AttrType::Bool => match raw {
                "true" => Some(AttrValue::Bool(true)),
                "false" => Some(AttrValue::Bool(false)),
                _ => None,
            },
            AttrType::Object => serde_json::from_str(raw).ok().map(AttrValue::Object),
        }
    }
}

fn render_num(n: f64) -> String {
    // i64 covers every id and counter the store hands out.
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Num(n as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(v: serde_json::Value) -> Self {
        AttrValue::Object(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
