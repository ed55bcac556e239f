//! Entity model
//!
//! The property model understood by every [`EntityStore`](crate::store::EntityStore):
//! a record is addressed by `(kind, name)` and carries a small set of typed,
//! named properties.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Address of one entity: the kind groups entities, the name is unique within it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    kind: String,
    name: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A single typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Approximate encoded size, used for store size limits
    fn size_hint(&self) -> usize {
        match self {
            PropertyValue::Null | PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) => 8,
            PropertyValue::Text(s) => s.len(),
            PropertyValue::Blob(b) => b.len(),
        }
    }
}

/// A record in the entity store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    key: EntityKey,
    properties: BTreeMap<String, PropertyValue>,
}

impl Entity {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Builder-style property setter
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Take a blob property out as shared bytes
    pub fn blob(&self, name: &str) -> Option<Bytes> {
        self.get(name)
            .and_then(PropertyValue::as_blob)
            .map(Bytes::copy_from_slice)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop every property, leaving only the key (keys-only projection)
    pub fn into_key_only(self) -> Self {
        Self::new(self.key)
    }

    /// Approximate size of the record payload
    pub fn size_hint(&self) -> usize {
        self.key.kind.len()
            + self.key.name.len()
            + self
                .properties
                .iter()
                .map(|(k, v)| k.len() + v.size_hint())
                .sum::<usize>()
    }
}
