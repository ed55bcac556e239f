//! # pagedkv
//!
//! Transactional maps and paged byte streams over an entity store with a
//! per-entity size limit:
//! - Map records with optimistic-concurrency transactions and bounded retry
//! - Read-through caching with invalidate-on-write
//! - Byte streams of any length, chunked into versioned page records
//! - A journaled local store with crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │        CachedMap         │   │  PagedStreamWriter / Reader  │
//! │  (read-through, delete   │   │  (writer lock, page versions)│
//! │   on write)              │   └──────────────┬───────────────┘
//! └────────────┬─────────────┘                  │
//!              │                                │
//! ┌────────────▼─────────────┐                  │
//! │     TransactionalMap     │                  │
//! │  (retry on conflict)     │                  │
//! └────────────┬─────────────┘                  │
//!              │                                │
//! ┌────────────▼────────────────────────────────▼───────────────┐
//! │                  EntityStore (trait)                        │
//! │      get / put / delete / batch / transaction / query       │
//! └────────────┬────────────────────────────────────────────────┘
//!              │
//!       ┌──────▼───────┐         ┌─────────────┐
//!       │ LocalEntity  │────────▶│   Journal   │
//!       │    Store     │         │  (Append)   │
//!       └──────────────┘         └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod entity;

pub mod store;
pub mod cache;
pub mod map;
pub mod stream;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::{CacheStore, MemoryCacheStore};
pub use config::{Config, WriteMode};
pub use entity::{Entity, EntityKey, PropertyValue};
pub use error::{PagedKvError, Result};
pub use map::{CachedMap, KeyParser, TransactionalMap, UpdatableMap};
pub use store::{EntityStore, LocalEntityStore};
pub use stream::{OpenMode, PagedStreamReader, PagedStreamWriter, StreamMetadata};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pagedkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wall-clock time in milliseconds since the Unix epoch
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
