//! Entity Store Module
//!
//! The backing key-value store consumed by maps and streams.
//!
//! ## Responsibilities
//! - Point reads, writes and deletes of [`Entity`] records
//! - Single-key transactions with optimistic conflict detection
//!   (first committer wins, later committers get `Conflict`)
//! - Batch delete
//! - Keys-only / full queries and counts by kind
//!
//! ## Implementations
//! - [`LocalEntityStore::in_memory`]: process-local, volatile
//! - [`LocalEntityStore::open`]: process-local, durable via a CRC-framed journal

pub mod journal;
mod local;

pub use local::{LocalEntityStore, StoreStats, MAX_ENTITY_SIZE};

use crate::entity::{Entity, EntityKey};
use crate::error::Result;

/// Lazy sequence of query results
pub type EntityIter<'a> = Box<dyn Iterator<Item = Result<Entity>> + 'a>;

/// Which parts of an entity a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Keys and properties
    Full,

    /// Keys only (properties stripped)
    KeysOnly,
}

/// A remote, size-limited, transactional entity store
pub trait EntityStore: Send + Sync {
    /// Read one entity; `Ok(None)` when it does not exist
    fn get(&self, key: &EntityKey) -> Result<Option<Entity>>;

    /// Create or overwrite one entity outside any transaction
    fn put(&self, entity: Entity) -> Result<()>;

    /// Delete one entity; deleting a missing key is not an error
    fn delete(&self, key: &EntityKey) -> Result<()>;

    /// Delete several entities in one round trip.
    ///
    /// May fail with `StoreTimeout`, in which case an unknown subset of the
    /// keys was deleted.
    fn delete_batch(&self, keys: &[EntityKey]) -> Result<()>;

    /// Start a transaction
    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>>;

    /// Iterate over every entity of a kind, in key-name order
    fn query(&self, kind: &str, projection: Projection) -> Result<EntityIter<'_>>;

    /// Number of entities of a kind
    fn count(&self, kind: &str) -> Result<usize>;
}

/// A single-key (or single entity group) optimistic transaction.
///
/// Reads observe committed state; writes are buffered until `commit`. A commit
/// fails with `Conflict` when any touched key was modified by someone else
/// after this transaction first touched it. Dropping an active transaction
/// rolls it back.
pub trait Transaction {
    fn get(&mut self, key: &EntityKey) -> Result<Option<Entity>>;

    fn put(&mut self, entity: Entity) -> Result<()>;

    fn delete(&mut self, key: &EntityKey) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;
}
