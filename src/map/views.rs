//! Lazy collection views over a map.
//!
//! Views hold no data: every iteration runs a fresh query against the store
//! and yields items as the query produces them. Iterators remember the stored
//! name of the last item they yielded, so `remove()` turns into a keyed delete
//! routed through the owning map (a [`CachedMap`](super::CachedMap) therefore
//! still invalidates its cache).

use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PagedKvError, Result};
use crate::store::{EntityIter, Projection};

use super::codec::decode_record;
use super::transactional::TransactionalMap;
use super::{KeyParser, UpdatableMap};

/// Map operations views route their lookups and removals through
pub(crate) trait ViewOwner<K, V>: UpdatableMap<K, V> {
    /// Delete the record stored under `name`
    fn remove_named(&self, name: &str) -> Result<()>;

    /// Transactional compare-and-delete
    fn remove_entry(&self, key: &K, expected: Option<&V>) -> Result<bool>;
}

fn no_current_item() -> PagedKvError {
    PagedKvError::IllegalState("remove() needs a preceding next()".to_string())
}

// =============================================================================
// Keys
// =============================================================================

/// Set view of a map's keys
pub struct KeySet<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    base: &'a TransactionalMap<K, V>,
    parser: &'a KeyParser<K>,
}

impl<'a, K, V> KeySet<'a, K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    pub(crate) fn new(
        owner: &'a dyn ViewOwner<K, V>,
        base: &'a TransactionalMap<K, V>,
        parser: &'a KeyParser<K>,
    ) -> Self {
        Self { owner, base, parser }
    }

    pub fn iter(&self) -> Result<KeyIter<'a, K, V>> {
        Ok(KeyIter {
            owner: self.owner,
            parser: self.parser,
            records: self.base.store().query(self.base.kind(), Projection::KeysOnly)?,
            last: None,
        })
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        self.owner.contains_key(key)
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&self, key: &K) -> Result<bool> {
        let present = self.owner.contains_key(key)?;
        if present {
            self.owner.remove(key)?;
        }
        Ok(present)
    }

    /// Keep only the keys `keep` accepts; returns whether anything was removed
    pub fn retain<F>(&self, mut keep: F) -> Result<bool>
    where
        F: FnMut(&K) -> bool,
    {
        let mut modified = false;
        let mut keys = self.iter()?;
        while let Some(key) = keys.next() {
            if !keep(&key?) {
                keys.remove()?;
                modified = true;
            }
        }
        Ok(modified)
    }

    pub fn len(&self) -> Result<usize> {
        self.owner.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.owner.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.owner.clear()
    }

    pub fn to_vec(&self) -> Result<Vec<K>> {
        self.iter()?.collect()
    }
}

/// Iterator over keys, rebuilt from stored names
pub struct KeyIter<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    parser: &'a KeyParser<K>,
    records: EntityIter<'a>,
    last: Option<String>,
}

impl<K, V> KeyIter<'_, K, V> {
    /// Remove the key most recently returned by `next()`
    pub fn remove(&mut self) -> Result<()> {
        let name = self.last.take().ok_or_else(no_current_item)?;
        self.owner.remove_named(&name)
    }
}

impl<K, V> Iterator for KeyIter<'_, K, V> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        let name = record.key().name();
        self.last = Some(name.to_string());

        Some(
            self.parser
                .parse(name)
                .ok_or_else(|| PagedKvError::InvalidKey(name.to_string())),
        )
    }
}

// =============================================================================
// Values
// =============================================================================

/// Collection view of a map's values; stored nulls appear as `None`
pub struct Values<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    base: &'a TransactionalMap<K, V>,
}

impl<'a, K, V> Values<'a, K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    pub(crate) fn new(owner: &'a dyn ViewOwner<K, V>, base: &'a TransactionalMap<K, V>) -> Self {
        Self { owner, base }
    }

    pub fn iter(&self) -> Result<ValueIter<'a, K, V>> {
        Ok(ValueIter {
            owner: self.owner,
            records: self.base.store().query(self.base.kind(), Projection::Full)?,
            last: None,
        })
    }

    pub fn contains(&self, value: &V) -> Result<bool> {
        self.owner.contains_value(value)
    }

    /// Remove every record holding `value`; returns whether any was removed
    pub fn remove(&self, value: Option<&V>) -> Result<bool> {
        self.retain(|current| current != value)
    }

    /// Keep only the values `keep` accepts; returns whether anything was removed
    pub fn retain<F>(&self, mut keep: F) -> Result<bool>
    where
        F: FnMut(Option<&V>) -> bool,
    {
        let mut modified = false;
        let mut values = self.iter()?;
        while let Some(value) = values.next() {
            if !keep(value?.as_ref()) {
                values.remove()?;
                modified = true;
            }
        }
        Ok(modified)
    }

    pub fn len(&self) -> Result<usize> {
        self.owner.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.owner.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.owner.clear()
    }

    pub fn to_vec(&self) -> Result<Vec<Option<V>>> {
        self.iter()?.collect()
    }
}

/// Iterator over decoded values
pub struct ValueIter<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    records: EntityIter<'a>,
    last: Option<String>,
}

impl<K, V> ValueIter<'_, K, V> {
    /// Remove the record whose value was most recently returned by `next()`
    pub fn remove(&mut self) -> Result<()> {
        let name = self.last.take().ok_or_else(no_current_item)?;
        self.owner.remove_named(&name)
    }
}

impl<K, V: DeserializeOwned> Iterator for ValueIter<'_, K, V> {
    type Item = Result<Option<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        self.last = Some(record.key().name().to_string());
        Some(Ok(decode_record(&record)))
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Set view of a map's entries
pub struct EntrySet<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    base: &'a TransactionalMap<K, V>,
    parser: &'a KeyParser<K>,
}

impl<'a, K, V> EntrySet<'a, K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    pub(crate) fn new(
        owner: &'a dyn ViewOwner<K, V>,
        base: &'a TransactionalMap<K, V>,
        parser: &'a KeyParser<K>,
    ) -> Self {
        Self { owner, base, parser }
    }

    pub fn iter(&self) -> Result<EntryIter<'a, K, V>> {
        Ok(EntryIter {
            keys: KeyIter {
                owner: self.owner,
                parser: self.parser,
                records: self.base.store().query(self.base.kind(), Projection::KeysOnly)?,
                last: None,
            },
        })
    }

    /// Whether `key` is present and maps to `value` (`None` = stored null)
    pub fn contains(&self, key: &K, value: Option<&V>) -> Result<bool> {
        if !self.owner.contains_key(key)? {
            return Ok(false);
        }
        Ok(self.owner.get(key)?.as_ref() == value)
    }

    /// Atomically remove `key` if it maps to `value`
    pub fn remove(&self, key: &K, value: Option<&V>) -> Result<bool> {
        self.owner.remove_entry(key, value)
    }

    /// Keep only the entries `keep` accepts; returns whether anything was removed
    pub fn retain<F>(&self, mut keep: F) -> Result<bool>
    where
        F: FnMut(&K, Option<&V>) -> bool,
    {
        let mut modified = false;
        let mut entries = self.iter()?;
        while let Some(entry) = entries.next() {
            let entry = entry?;
            let value = entry.value()?;
            if !keep(entry.key(), value.as_ref()) {
                entries.remove()?;
                modified = true;
            }
        }
        Ok(modified)
    }

    pub fn len(&self) -> Result<usize> {
        self.owner.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.owner.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.owner.clear()
    }

    /// Materialize every entry with its current value
    pub fn to_vec(&self) -> Result<Vec<(K, Option<V>)>> {
        self.iter()?
            .map(|entry| {
                let entry = entry?;
                let value = entry.value()?;
                Ok((entry.into_key(), value))
            })
            .collect()
    }
}

/// One entry of a map; its value is read lazily from the map
pub struct MapEntry<'a, K, V> {
    owner: &'a dyn ViewOwner<K, V>,
    key: K,
}

impl<K, V> MapEntry<'_, K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_key(self) -> K {
        self.key
    }

    /// Current value under this entry's key
    pub fn value(&self) -> Result<Option<V>> {
        self.owner.get(&self.key)
    }

    /// Store a new value under this entry's key
    pub fn set_value(&self, value: V) -> Result<Option<V>> {
        self.owner.put(&self.key, value)
    }
}

/// Iterator over entries
pub struct EntryIter<'a, K, V> {
    keys: KeyIter<'a, K, V>,
}

impl<K, V> EntryIter<'_, K, V> {
    /// Remove the entry most recently returned by `next()`
    pub fn remove(&mut self) -> Result<()> {
        self.keys.remove()
    }
}

impl<'a, K, V> Iterator for EntryIter<'a, K, V> {
    type Item = Result<MapEntry<'a, K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let owner = self.keys.owner;
        Some(self.keys.next()?.map(|key| MapEntry { owner, key }))
    }
}
