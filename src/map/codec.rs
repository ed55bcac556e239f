//! Value <-> record payload encoding.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::{Entity, EntityKey, PropertyValue};
use crate::error::{PagedKvError, Result};

/// Payload property of a map record
pub(crate) const VALUE_PROPERTY: &str = "value";

/// Build a record; `None` stores the null marker
pub(crate) fn encode_record<V: Serialize>(key: EntityKey, value: Option<&V>) -> Result<Entity> {
    let payload = match value {
        Some(value) => PropertyValue::Blob(encode_value(value)?),
        None => PropertyValue::Null,
    };
    Ok(Entity::new(key).with(VALUE_PROPERTY, payload))
}

/// Decode a record's payload; corrupt or mistyped payloads read as absent
pub(crate) fn decode_record<V: DeserializeOwned>(entity: &Entity) -> Option<V> {
    match entity.get(VALUE_PROPERTY)? {
        PropertyValue::Blob(bytes) => match bincode::deserialize(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key = %entity.key(), error = %e, "undecodable map value");
                None
            }
        },
        _ => None,
    }
}

pub(crate) fn encode_value<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| PagedKvError::Serialization(format!("cannot serialize value: {}", e)))
}

/// Cache entries keep the null marker: `Some(None)` is a cached null,
/// `None` means the cached bytes were unusable
pub(crate) fn encode_cached<V: Serialize>(value: Option<&V>) -> Result<Vec<u8>> {
    bincode::serialize(&value)
        .map_err(|e| PagedKvError::Serialization(format!("cannot serialize value: {}", e)))
}

pub(crate) fn decode_cached<V: DeserializeOwned>(bytes: &[u8]) -> Option<Option<V>> {
    bincode::deserialize(bytes).ok()
}
