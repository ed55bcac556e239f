//! Transactional map over an entity store.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Config, WriteMode};
use crate::entity::{Entity, EntityKey};
use crate::error::{PagedKvError, Result};
use crate::store::{EntityStore, Projection, Transaction};

use super::codec::{decode_record, encode_record};
use super::views::{EntrySet, KeySet, ViewOwner, Values};
use super::{KeyParser, UpdatableMap};

/// What one transactional attempt decided
pub(crate) enum Outcome<T> {
    /// Commit the transaction, then return the value
    Commit(T),

    /// Roll back and return the value without retrying
    Abort(T),
}

/// A map whose records live in an [`EntityStore`]
///
/// ## Retry Policy
///
/// `put`, `remove` and `update` run inside a transaction. When the commit
/// conflicts with a concurrent writer the transaction is rolled back and the
/// whole attempt (read included) is repeated, up to `Config::max_retries`
/// times. An exhausted budget surfaces as `PagedKvError::Conflict`; callers
/// that want to keep going should back off before trying again.
///
/// ## Write Modes
///
/// In [`WriteMode::FireAndForget`] `put`/`remove` skip the transaction and
/// the old-value read, write directly, and always return `None`.
///
/// ## Reads
///
/// `get`, `contains_key`, `len` and the views are plain, non-transactional
/// reads. `len` is a count query and only advisory under concurrent writes.
pub struct TransactionalMap<K, V> {
    store: Arc<dyn EntityStore>,
    kind: String,
    key_parser: Option<KeyParser<K>>,
    config: Config,
    _values: PhantomData<fn() -> V>,
}

impl<K, V> TransactionalMap<K, V> {
    /// Create a map stored under entity kind `kind`
    pub fn new(store: Arc<dyn EntityStore>, kind: impl Into<String>, config: Config) -> Result<Self> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(PagedKvError::Config("map kind cannot be empty".to_string()));
        }
        config.validate()?;

        Ok(Self {
            store,
            kind,
            key_parser: None,
            config,
            _values: PhantomData,
        })
    }

    /// Enable `keys()` and `entries()` by supplying a key parser
    pub fn with_key_parser(mut self, parser: KeyParser<K>) -> Self {
        self.key_parser = Some(parser);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub(crate) fn key_parser(&self) -> Result<&KeyParser<K>> {
        self.key_parser.as_ref().ok_or_else(|| {
            PagedKvError::Unsupported(
                "key views need a KeyParser to rebuild keys from their stored names".to_string(),
            )
        })
    }

    pub(crate) fn record_key_named(&self, name: &str) -> EntityKey {
        EntityKey::new(self.kind.as_str(), name)
    }

    /// Run `attempt` in a fresh transaction until it commits, aborts, fails
    /// with a non-conflict error, or the retry budget is spent
    pub(crate) fn run_transaction<T, F>(&self, op: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(&mut dyn Transaction) -> Result<Outcome<T>>,
    {
        let attempts = self.config.max_attempts();

        for n in 1..=attempts {
            let mut txn = self.store.begin_transaction()?;

            let outcome = match attempt(txn.as_mut()) {
                Ok(outcome) => outcome,
                Err(e) => {
                    if txn.is_active() {
                        txn.rollback()?;
                    }
                    return Err(e);
                }
            };

            match outcome {
                Outcome::Abort(value) => {
                    if txn.is_active() {
                        txn.rollback()?;
                    }
                    return Ok(value);
                }
                Outcome::Commit(value) => match txn.commit() {
                    Ok(()) => return Ok(value),
                    Err(e) if e.is_conflict() => {
                        if txn.is_active() {
                            txn.rollback()?;
                        }
                        tracing::debug!(kind = %self.kind, op, attempt = n, attempts, "commit conflict");
                    }
                    Err(e) => {
                        if txn.is_active() {
                            txn.rollback()?;
                        }
                        return Err(e);
                    }
                },
            }
        }

        tracing::warn!(kind = %self.kind, op, attempts, "retry budget exhausted");
        Err(PagedKvError::Conflict { attempts })
    }
}

impl<K, V> TransactionalMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    pub(crate) fn record_key(&self, key: &K) -> EntityKey {
        EntityKey::new(self.kind.as_str(), key.to_string())
    }

    /// Raw record lookup, `None` when absent
    pub(crate) fn get_entity(&self, key: &K) -> Result<Option<Entity>> {
        self.store.get(&self.record_key(key))
    }

    /// Delete a record by its stored key, honouring the write mode
    pub(crate) fn remove_record(&self, record_key: EntityKey) -> Result<Option<V>> {
        if self.config.write_mode == WriteMode::FireAndForget {
            self.store.delete(&record_key)?;
            return Ok(None);
        }

        self.run_transaction("remove", |txn| {
            let previous = txn.get(&record_key)?;
            txn.delete(&record_key)?;
            Ok(Outcome::Commit(previous.as_ref().and_then(decode_record)))
        })
    }

    /// Delete the record under `key` only if it currently holds `expected`
    /// (`None` matches a stored null). Returns whether a record was deleted.
    pub fn remove_if(&self, key: &K, expected: Option<&V>) -> Result<bool> {
        let record_key = self.record_key(key);

        self.run_transaction("remove_if", |txn| {
            let Some(entity) = txn.get(&record_key)? else {
                return Ok(Outcome::Abort(false));
            };
            let current: Option<V> = decode_record(&entity);
            if current.as_ref() != expected {
                return Ok(Outcome::Abort(false));
            }
            txn.delete(&record_key)?;
            Ok(Outcome::Commit(true))
        })
    }

    /// Delete a batch, swallowing a timeout. Returns how many keys were
    /// dropped by a timed-out batch.
    fn delete_batch(&self, batch: &mut Vec<EntityKey>) -> Result<usize> {
        let result = match self.store.delete_batch(batch) {
            Ok(()) => Ok(0),
            Err(PagedKvError::StoreTimeout(msg)) => {
                // Not retried: the batch's records may survive the clear
                tracing::warn!(kind = %self.kind, keys = batch.len(), reason = %msg, "batch delete timed out");
                Ok(batch.len())
            }
            Err(e) => Err(e),
        };
        batch.clear();
        result
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Lazy view of the keys; needs a key parser
    pub fn keys(&self) -> Result<KeySet<'_, K, V>> {
        self.key_set_for(self)
    }

    /// Lazy view of the values
    pub fn values(&self) -> Values<'_, K, V> {
        self.values_for(self)
    }

    /// Lazy view of the entries; needs a key parser
    pub fn entries(&self) -> Result<EntrySet<'_, K, V>> {
        self.entry_set_for(self)
    }

    pub(crate) fn key_set_for<'a>(&'a self, owner: &'a dyn ViewOwner<K, V>) -> Result<KeySet<'a, K, V>> {
        Ok(KeySet::new(owner, self, self.key_parser()?))
    }

    pub(crate) fn values_for<'a>(&'a self, owner: &'a dyn ViewOwner<K, V>) -> Values<'a, K, V> {
        Values::new(owner, self)
    }

    pub(crate) fn entry_set_for<'a>(&'a self, owner: &'a dyn ViewOwner<K, V>) -> Result<EntrySet<'a, K, V>> {
        Ok(EntrySet::new(owner, self, self.key_parser()?))
    }
}

impl<K, V> UpdatableMap<K, V> for TransactionalMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    fn len(&self) -> Result<usize> {
        self.store.count(&self.kind)
    }

    fn is_empty(&self) -> Result<bool> {
        let mut records = self.store.query(&self.kind, Projection::KeysOnly)?;
        match records.next() {
            None => Ok(true),
            Some(record) => record.map(|_| false),
        }
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.get_entity(key)?.as_ref().and_then(decode_record))
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get_entity(key)?.is_some())
    }

    fn contains_value(&self, value: &V) -> Result<bool> {
        for record in self.store.query(&self.kind, Projection::Full)? {
            if decode_record::<V>(&record?).as_ref() == Some(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn put_value(&self, key: &K, value: Option<V>) -> Result<Option<V>> {
        let record_key = self.record_key(key);
        let entity = encode_record(record_key.clone(), value.as_ref())?;

        if self.config.write_mode == WriteMode::FireAndForget {
            self.store.put(entity)?;
            return Ok(None);
        }

        self.run_transaction("put", |txn| {
            let previous = txn.get(&record_key)?;
            txn.put(entity.clone())?;
            Ok(Outcome::Commit(previous.as_ref().and_then(decode_record)))
        })
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.remove_record(self.record_key(key))
    }

    /// Delete every record in batches of `Config::delete_batch_size`.
    ///
    /// A batch that times out is logged and skipped, not retried, so records
    /// can survive a clear that returned `Ok`.
    fn clear(&self) -> Result<()> {
        let batch_size = self.config.delete_batch_size;
        let mut batch = Vec::with_capacity(batch_size);
        let mut dropped = 0;

        for record in self.store.query(&self.kind, Projection::KeysOnly)? {
            batch.push(record?.key().clone());
            if batch.len() == batch_size {
                dropped += self.delete_batch(&mut batch)?;
            }
        }
        if !batch.is_empty() {
            dropped += self.delete_batch(&mut batch)?;
        }

        if dropped > 0 {
            tracing::warn!(kind = %self.kind, dropped, "clear left records behind");
        }
        Ok(())
    }

    fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.store.put(encode_record(self.record_key(&key), Some(&value))?)?;
        }
        Ok(())
    }

    fn update<F>(&self, key: &K, mut f: F) -> Result<Option<V>>
    where
        F: FnMut(Option<V>) -> Option<V>,
    {
        let record_key = self.record_key(key);

        self.run_transaction("update", |txn| {
            let Some(current) = txn.get(&record_key)? else {
                return Ok(Outcome::Abort(None));
            };
            let updated = f(decode_record(&current));
            txn.put(encode_record(record_key.clone(), updated.as_ref())?)?;
            Ok(Outcome::Commit(updated))
        })
    }
}

impl<K, V> ViewOwner<K, V> for TransactionalMap<K, V>
where
    K: Display,
    V: Serialize + DeserializeOwned + PartialEq,
{
    fn remove_named(&self, name: &str) -> Result<()> {
        self.remove_record(self.record_key_named(name)).map(|_| ())
    }

    fn remove_entry(&self, key: &K, expected: Option<&V>) -> Result<bool> {
        self.remove_if(key, expected)
    }
}
