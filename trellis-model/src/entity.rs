//! Typed view over a stored record.

use crate::schema::AttrSchema;
use serde::{Deserialize, Serialize};
use trellis_store::StoredRecord;
use trellis_types::{AttrValue, Attributes, ObjectId};

/// A validated entity: a bag of typed attributes.
///
/// Entities are produced by reading a record back through the type's
/// schema, so every attribute carries its declared type. Keys absent
/// from the schema never survive the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    attrs: Attributes,
}

impl Entity {
    #[must_use]
    pub fn new(attrs: Attributes) -> Self {
        Self { attrs }
    }

    /// Decodes a stored record through the schema. Undeclared fields and
    /// fields whose stored text does not parse as the declared type are
    /// skipped.
    #[must_use]
    pub fn from_stored(schema: &AttrSchema, record: StoredRecord) -> Self {
        let mut attrs = Attributes::new();
        for (name, raw) in record {
            let Some(desc) = schema.get(&name) else {
                continue;
            };
            if let Some(value) = AttrValue::from_stored(desc.attr_type, &raw) {
                attrs.insert(name, value);
            }
        }
        Self { attrs }
    }

    #[must_use]
    pub fn id(&self) -> Option<ObjectId> {
        self.attrs
            .get("id")
            .and_then(AttrValue::as_num)
            .and_then(ObjectId::from_num)
    }

    /// Creation timestamp in milliseconds.
    #[must_use]
    pub fn created(&self) -> Option<i64> {
        self.attrs
            .get("created")
            .and_then(AttrValue::as_num)
            .map(|n| n as i64)
    }

    /// Last-write timestamp in milliseconds.
    #[must_use]
    pub fn updated(&self) -> Option<i64> {
        self.attrs
            .get("updated")
            .and_then(AttrValue::as_num)
            .map(|n| n as i64)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_str)
    }

    #[must_use]
    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(AttrValue::as_num)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.attrs.get(name).and_then(AttrValue::as_bool)
    }

    #[must_use]
    pub fn get_object(&self, name: &str) -> Option<&serde_json::Value> {
        self.attrs.get(name).and_then(AttrValue::as_object)
    }

    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    #[must_use]
    pub fn into_attrs(self) -> Attributes {
        self.attrs
    }

    /// Removes an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.remove(name)
    }

    /// Encodes for storage.
    #[must_use]
    pub fn to_stored(&self) -> StoredRecord {
        render_attrs(&self.attrs)
    }
}

/// Renders typed attributes into the store's string fields.
pub(crate) fn render_attrs(attrs: &Attributes) -> StoredRecord {
    attrs
        .iter()
        .map(|(name, value)| (name.clone(), value.render()))
        .collect()
}
