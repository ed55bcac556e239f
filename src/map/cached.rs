//! Cache decorator for [`TransactionalMap`].

use std::fmt::Display;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::Result;

use super::codec::{decode_cached, decode_record, encode_cached};
use super::transactional::TransactionalMap;
use super::views::{EntrySet, KeySet, ViewOwner, Values};
use super::UpdatableMap;

/// A [`TransactionalMap`] fronted by a [`CacheStore`]
///
/// - Reads go to the cache first; a miss reads the store and populates the
///   cache (populate failures are ignored).
/// - Writes go to the store, then *delete* the cache entry. The cache is never
///   overwritten with a value whose commit might still fail; the next read
///   fetches and re-populates.
/// - Cache entries keep the null marker, so a cached stored-null is a hit.
///
/// Cache keys are `"{kind}:{record name}"`.
pub struct CachedMap<K, V> {
    inner: TransactionalMap<K, V>,
    cache: Arc<dyn CacheStore>,
}

impl<K, V> CachedMap<K, V> {
    pub fn new(inner: TransactionalMap<K, V>, cache: Arc<dyn CacheStore>) -> Self {
        Self { inner, cache }
    }

    /// The undecorated map
    pub fn inner(&self) -> &TransactionalMap<K, V> {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    fn cache_key(&self, name: &str) -> String {
        format!("{}:{}", self.inner.kind(), name)
    }

    fn invalidate_named(&self, name: &str) {
        let cache_key = self.cache_key(name);
        if let Err(e) = self.cache.remove(&cache_key) {
            tracing::warn!(key = %cache_key, error = %e, "cache invalidation failed");
        }
    }
}

impl<K, V> CachedMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    fn invalidate(&self, key: &K) {
        self.invalidate_named(&key.to_string());
    }

    /// Cached value for `key`: `Some(None)` is a cached null, `None` a miss
    fn cached(&self, key: &K) -> Option<Option<V>> {
        let cache_key = self.cache_key(&key.to_string());
        match self.cache.get(&cache_key) {
            Ok(Some(bytes)) => {
                let value = decode_cached(&bytes);
                if value.is_none() {
                    tracing::debug!(key = %cache_key, "undecodable cache entry, treating as miss");
                }
                value
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key = %cache_key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn populate(&self, key: &K, value: Option<&V>) {
        let cache_key = self.cache_key(&key.to_string());
        let result = encode_cached(value)
            .and_then(|bytes| self.cache.put(&cache_key, bytes, self.config().cache_ttl));
        if let Err(e) = result {
            tracing::debug!(key = %cache_key, error = %e, "cache populate failed");
        }
    }

    /// See [`TransactionalMap::remove_if`]; invalidates the cache entry
    pub fn remove_if(&self, key: &K, expected: Option<&V>) -> Result<bool> {
        let removed = self.inner.remove_if(key, expected)?;
        if removed {
            self.invalidate(key);
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Result<KeySet<'_, K, V>> {
        self.inner.key_set_for(self)
    }

    pub fn values(&self) -> Values<'_, K, V> {
        self.inner.values_for(self)
    }

    pub fn entries(&self) -> Result<EntrySet<'_, K, V>> {
        self.inner.entry_set_for(self)
    }
}

impl<K, V> UpdatableMap<K, V> for CachedMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn is_empty(&self) -> Result<bool> {
        self.inner.is_empty()
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        if let Some(value) = self.cached(key) {
            return Ok(value);
        }

        let Some(record) = self.inner.get_entity(key)? else {
            return Ok(None);
        };
        let value = decode_record(&record);
        self.populate(key, value.as_ref());
        Ok(value)
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        let cache_key = self.cache_key(&key.to_string());
        if matches!(self.cache.contains_key(&cache_key), Ok(true)) {
            return Ok(true);
        }
        self.inner.contains_key(key)
    }

    fn contains_value(&self, value: &V) -> Result<bool> {
        self.inner.contains_value(value)
    }

    fn put_value(&self, key: &K, value: Option<V>) -> Result<Option<V>> {
        let previous = self.inner.put_value(key, value)?;
        self.invalidate(key);
        Ok(previous)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        let previous = self.inner.remove(key)?;
        self.invalidate(key);
        Ok(previous)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()?;
        if let Err(e) = self.cache.clear() {
            tracing::warn!(kind = %self.inner.kind(), error = %e, "cache clear failed");
        }
        Ok(())
    }

    fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let names: Vec<String> = entries.iter().map(|(key, _)| key.to_string()).collect();

        let result = self.inner.put_all(entries);

        // Some records may have been written before a failure
        let cache_keys: Vec<String> = names.iter().map(|name| self.cache_key(name)).collect();
        if let Err(e) = self.cache.remove_all(&cache_keys) {
            tracing::warn!(keys = cache_keys.len(), error = %e, "cache invalidation failed");
        }
        result
    }

    fn update<F>(&self, key: &K, f: F) -> Result<Option<V>>
    where
        F: FnMut(Option<V>) -> Option<V>,
    {
        let updated = self.inner.update(key, f)?;
        self.invalidate(key);
        Ok(updated)
    }
}

impl<K, V> ViewOwner<K, V> for CachedMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    fn remove_named(&self, name: &str) -> Result<()> {
        self.inner.remove_named(name)?;
        self.invalidate_named(name);
        Ok(())
    }

    fn remove_entry(&self, key: &K, expected: Option<&V>) -> Result<bool> {
        self.remove_if(key, expected)
    }
}
