//! Attribute schemas and validation.
//!
//! A schema is built once when an entity type is composed and never
//! mutated afterwards. The reference registry's counter and pointer
//! attributes are injected while the schema is still being built, so a
//! frozen schema always describes exactly what may appear on disk.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trellis_types::{AttrType, AttrValue, Attributes};

/// Declares one attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrDescriptor {
    /// Declared type; values are coerced to it or dropped.
    pub attr_type: AttrType,
    /// Must be present after defaulting for a create to succeed.
    pub required: bool,
    /// Marked sensitive; surfaced via [`AttrSchema::private_attrs`] for
    /// redacting projections. Projections are identity unless overridden.
    pub private: bool,
    /// Filled in on create when the caller supplies no value.
    pub default: Option<AttrValue>,
}

impl AttrDescriptor {
    /// A plain optional attribute of the given type.
    #[must_use]
    pub const fn new(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            required: false,
            private: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn private(mut self) -> Self {
        self.private = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Validation mode: creates default and enforce required attributes,
/// updates only require identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    Create,
    Update,
}

/// Immutable per-type attribute schema.
///
/// `id`, `created`, and `updated` are declared implicitly as numbers;
/// an explicit declaration for them wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSchema {
    attrs: BTreeMap<String, AttrDescriptor>,
}

impl Default for AttrSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl AttrSchema {
    /// A schema containing only the implicit attributes.
    #[must_use]
    pub fn new() -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_string(), AttrDescriptor::new(AttrType::Num));
        attrs.insert(
            "created".to_string(),
            AttrDescriptor::new(AttrType::Num).private(),
        );
        attrs.insert(
            "updated".to_string(),
            AttrDescriptor::new(AttrType::Num).private(),
        );
        Self { attrs }
    }

    /// Declares an attribute, replacing any previous declaration of the
    /// same name.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, desc: AttrDescriptor) -> Self {
        self.attrs.insert(name.into(), desc);
        self
    }

    /// Declares an attribute only when it is not already declared. Used
    /// by injected relationship attributes, which must never override an
    /// explicit declaration.
    #[must_use]
    pub fn with_attr_if_absent(mut self, name: impl Into<String>, desc: AttrDescriptor) -> Self {
        self.attrs.entry(name.into()).or_insert(desc);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrDescriptor> {
        self.attrs.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrDescriptor)> {
        self.attrs.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    /// Names of attributes required on create.
    pub fn required_attrs(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .iter()
            .filter(|(_, desc)| desc.required)
            .map(|(name, _)| name.as_str())
    }

    /// Names of attributes flagged private.
    pub fn private_attrs(&self) -> impl Iterator<Item = &str> {
        self.attrs
            .iter()
            .filter(|(_, desc)| desc.private)
            .map(|(name, _)| name.as_str())
    }

    /// Validates candidate attributes, consuming them and returning the
    /// cleaned map.
    ///
    /// Undeclared keys are dropped. Mismatched values take one coercion
    /// step (see [`AttrValue::coerce_to`]) and are dropped when it fails;
    /// nothing partially-typed ever continues toward storage. On create,
    /// defaults fill absent attributes before the required check, and a
    /// still-absent required attribute fails validation. Absence means
    /// the key is missing, so `0` and `false` satisfy required. On
    /// update, only the identifying `id` is enforced.
    pub fn validate(&self, attrs: Attributes, mode: ValidateMode) -> ModelResult<Attributes> {
        let mut out = Attributes::new();
        for (name, value) in attrs {
            let Some(desc) = self.attrs.get(&name) else {
                continue;
            };
            if let Some(coerced) = value.coerce_to(desc.attr_type) {
                out.insert(name, coerced);
            }
        }

        match mode {
            ValidateMode::Create => {
                for (name, desc) in &self.attrs {
                    if let Some(default) = &desc.default {
                        out.entry(name.clone()).or_insert_with(|| default.clone());
                    }
                }
                for (name, desc) in &self.attrs {
                    if desc.required && !out.contains_key(name) {
                        return Err(ModelError::MissingRequired { attr: name.clone() });
                    }
                }
            }
            ValidateMode::Update => {
                if !out.contains_key("id") {
                    return Err(ModelError::IdentityRequired { what: "id" });
                }
            }
        }

        Ok(out)
    }
}
