//! Cache Module
//!
//! Best-effort, TTL-based key-value cache consumed by
//! [`CachedMap`](crate::map::CachedMap).
//!
//! ## Contract
//! - Never authoritative: entries may vanish at any time
//! - No enumeration: callers address entries by key only
//! - Values are opaque bytes

mod memory;

pub use memory::{CacheStats, MemoryCacheStore};

use std::time::Duration;

use crate::error::Result;

/// A best-effort distributed cache
pub trait CacheStore: Send + Sync {
    /// Read an entry; `Ok(None)` on a miss
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite an entry, optionally expiring after `ttl`
    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove an entry, returning whether it was present
    fn remove(&self, key: &str) -> Result<bool>;

    /// Remove several entries
    fn remove_all(&self, keys: &[String]) -> Result<()>;

    /// Drop every entry
    fn clear(&self) -> Result<()>;

    fn contains_key(&self, key: &str) -> Result<bool>;

    /// Approximate number of live entries
    fn item_count(&self) -> Result<u64>;
}
