//! Page records.

use bytes::Bytes;

use crate::entity::{Entity, EntityKey, PropertyValue};
use crate::error::{PagedKvError, Result};

const DATA_PROPERTY: &str = "data";
const VERSION_PROPERTY: &str = "version";

/// One fixed-capacity chunk of a stream, tagged with the writer session
/// version that flushed it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Page {
    pub data: Bytes,
    pub version: u64,
}

impl Page {
    /// Pages are keyed by their index in lowercase hex, which can never
    /// collide with the metadata sentinel name
    pub fn key(stream: &str, index: u64) -> EntityKey {
        EntityKey::new(stream, format!("{:x}", index))
    }

    pub fn to_entity(&self, stream: &str, index: u64) -> Entity {
        Entity::new(Self::key(stream, index))
            .with(DATA_PROPERTY, PropertyValue::Blob(self.data.to_vec()))
            .with(VERSION_PROPERTY, PropertyValue::Int(self.version as i64))
    }

    pub fn from_entity(entity: &Entity) -> Result<Self> {
        let version = entity
            .get(VERSION_PROPERTY)
            .and_then(PropertyValue::as_int)
            .ok_or_else(|| malformed(entity, VERSION_PROPERTY))?;
        let data = match entity.get(DATA_PROPERTY) {
            Some(PropertyValue::Blob(bytes)) => Bytes::copy_from_slice(bytes),
            Some(PropertyValue::Null) | None => Bytes::new(),
            Some(_) => return Err(malformed(entity, DATA_PROPERTY)),
        };

        Ok(Self {
            data,
            version: version as u64,
        })
    }
}

fn malformed(entity: &Entity, property: &str) -> PagedKvError {
    PagedKvError::Store(format!(
        "page {} has a missing or mistyped '{}' property",
        entity.key(),
        property
    ))
}
