//! Map Module
//!
//! Associative-map facades over an [`EntityStore`](crate::store::EntityStore).
//!
//! ## Responsibilities
//! - Serialize values into opaque record payloads (bincode)
//! - Wrap mutations in bounded-retry transactions
//! - Lazy key / value / entry views with removal through the iterator
//! - Optional read-through, invalidate-on-write caching ([`CachedMap`])
//!
//! ## Record Layout
//! One entity per key, kind = map name, entity name = `key.to_string()`.
//! Stringification must be collision-free: two keys render to the same string
//! only if they are equal. The payload property holds either the encoded value
//! or an explicit null marker, so "stored null" and "absent" stay distinct.

mod cached;
mod codec;
mod transactional;
mod views;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use cached::CachedMap;
pub use transactional::TransactionalMap;
pub use views::{EntryIter, EntrySet, KeyIter, KeySet, MapEntry, ValueIter, Values};

use crate::error::Result;

/// The public map contract shared by [`TransactionalMap`] and [`CachedMap`]
///
/// `None` doubles as "absent" and "stored null" in return values; use
/// [`contains_key`](UpdatableMap::contains_key) to tell them apart.
pub trait UpdatableMap<K, V> {
    /// Number of records (advisory under concurrent mutation)
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool>;

    /// Value stored under `key`; `None` if absent, null, or undecodable
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Whether a record exists, regardless of its payload
    fn contains_key(&self, key: &K) -> Result<bool>;

    /// Whether any record decodes to `value` (full scan)
    fn contains_value(&self, value: &V) -> Result<bool>;

    /// Store `value` (or an explicit null) under `key`, returning the
    /// previous value in `ReturnPrevious` mode
    fn put_value(&self, key: &K, value: Option<V>) -> Result<Option<V>>;

    /// Delete the record under `key`, returning the previous value in
    /// `ReturnPrevious` mode
    fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Delete every record (best effort, see [`TransactionalMap::clear`])
    fn clear(&self) -> Result<()>;

    fn put(&self, key: &K, value: V) -> Result<Option<V>> {
        self.put_value(key, Some(value))
    }

    /// Store an explicit null under `key`
    fn put_null(&self, key: &K) -> Result<Option<V>> {
        self.put_value(key, None)
    }

    /// Store every pair, one record at a time, outside any transaction
    fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        Self: Sized;

    /// Atomic read-modify-write of an existing record.
    ///
    /// Returns `Ok(None)` without writing when `key` is absent (no upsert);
    /// otherwise stores and returns `f(current)`. `f` may run more than once
    /// when commits conflict.
    fn update<F>(&self, key: &K, f: F) -> Result<Option<V>>
    where
        F: FnMut(Option<V>) -> Option<V>,
        Self: Sized;
}

/// Rebuilds typed keys from their stored string form
pub struct KeyParser<K> {
    parse: Arc<dyn Fn(&str) -> Option<K> + Send + Sync>,
}

impl<K> KeyParser<K> {
    pub fn new(parse: impl Fn(&str) -> Option<K> + Send + Sync + 'static) -> Self {
        Self {
            parse: Arc::new(parse),
        }
    }

    pub fn parse(&self, name: &str) -> Option<K> {
        (self.parse)(name)
    }
}

impl<K: FromStr> KeyParser<K> {
    /// Parser for keys whose `Display` output round-trips through `FromStr`
    pub fn via_from_str() -> Self {
        Self::new(|name| name.parse().ok())
    }
}

impl<K> Clone for KeyParser<K> {
    fn clone(&self) -> Self {
        Self {
            parse: Arc::clone(&self.parse),
        }
    }
}

impl<K> fmt::Debug for KeyParser<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyParser")
    }
}
