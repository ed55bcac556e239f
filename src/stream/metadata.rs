//! Stream metadata and the writer-lock protocol.

use std::time::Duration;

use crate::entity::{Entity, EntityKey, PropertyValue};
use crate::error::{PagedKvError, Result};
use crate::store::{EntityStore, Transaction};
use crate::unix_millis;

use super::{OpenMode, METADATA_NAME};

const PAGE_COUNT_PROPERTY: &str = "page";
const CURSOR_PROPERTY: &str = "pointer";
const VERSION_PROPERTY: &str = "version";
const LOCKED_PROPERTY: &str = "locked";
const CREATED_PROPERTY: &str = "created";
const UPDATED_PROPERTY: &str = "updated";

/// Per-stream bookkeeping record, stored under the `"m"` sentinel name
///
/// The logical length of the stream is `page_count * page_size + cursor`:
/// `page_count` full pages followed by `cursor` bytes in the tail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Number of full pages
    pub page_count: u64,

    /// Bytes used in the tail page (`0..page_size`)
    pub cursor: usize,

    /// Bumped by every writer session; pages are tagged with it
    pub version: u64,

    /// Whether a writer session holds the lock
    pub locked: bool,

    /// Unix millis
    pub created_at: u64,

    /// Unix millis; also the lock's acquisition time while `locked`
    pub updated_at: u64,
}

impl StreamMetadata {
    /// Zero-state metadata for a stream that was never written
    pub fn empty(now: u64) -> Self {
        Self {
            page_count: 0,
            cursor: 0,
            version: 0,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Logical length in bytes
    pub fn len(&self, page_size: usize) -> u64 {
        self.page_count * page_size as u64 + self.cursor as u64
    }

    pub fn is_empty(&self) -> bool {
        self.page_count == 0 && self.cursor == 0
    }

    /// A lock is fresh while `now < updated_at + timeout`; a stale lock may
    /// be seized by the next writer
    pub fn is_lock_fresh(&self, now: u64, timeout: Duration) -> bool {
        self.locked && now < self.updated_at.saturating_add(timeout.as_millis() as u64)
    }

    pub(crate) fn key(stream: &str) -> EntityKey {
        EntityKey::new(stream, METADATA_NAME)
    }

    pub(crate) fn to_entity(&self, stream: &str) -> Entity {
        Entity::new(Self::key(stream))
            .with(PAGE_COUNT_PROPERTY, PropertyValue::Int(self.page_count as i64))
            .with(CURSOR_PROPERTY, PropertyValue::Int(self.cursor as i64))
            .with(VERSION_PROPERTY, PropertyValue::Int(self.version as i64))
            .with(LOCKED_PROPERTY, PropertyValue::Bool(self.locked))
            .with(CREATED_PROPERTY, PropertyValue::Int(self.created_at as i64))
            .with(UPDATED_PROPERTY, PropertyValue::Int(self.updated_at as i64))
    }

    pub(crate) fn from_entity(entity: &Entity) -> Result<Self> {
        let int = |name: &str| {
            entity
                .get(name)
                .and_then(PropertyValue::as_int)
                .ok_or_else(|| malformed(entity, name))
        };

        Ok(Self {
            page_count: int(PAGE_COUNT_PROPERTY)? as u64,
            cursor: int(CURSOR_PROPERTY)? as usize,
            version: int(VERSION_PROPERTY)? as u64,
            locked: entity
                .get(LOCKED_PROPERTY)
                .and_then(PropertyValue::as_bool)
                .ok_or_else(|| malformed(entity, LOCKED_PROPERTY))?,
            created_at: int(CREATED_PROPERTY)? as u64,
            updated_at: int(UPDATED_PROPERTY)? as u64,
        })
    }
}

fn malformed(entity: &Entity, property: &str) -> PagedKvError {
    PagedKvError::Store(format!(
        "stream metadata {} has a missing or mistyped '{}' property",
        entity.key(),
        property
    ))
}

/// Stored metadata, if the stream was ever opened for writing
pub(crate) fn load(store: &dyn EntityStore, stream: &str) -> Result<Option<StreamMetadata>> {
    store
        .get(&StreamMetadata::key(stream))?
        .as_ref()
        .map(StreamMetadata::from_entity)
        .transpose()
}

/// Stored metadata, or the zero-state for a stream that does not exist yet
pub(crate) fn read(store: &dyn EntityStore, stream: &str) -> Result<StreamMetadata> {
    Ok(load(store, stream)?.unwrap_or_else(|| StreamMetadata::empty(unix_millis())))
}

fn read_in(txn: &mut dyn Transaction, stream: &str, now: u64) -> Result<StreamMetadata> {
    match txn.get(&StreamMetadata::key(stream))? {
        Some(entity) => StreamMetadata::from_entity(&entity),
        None => Ok(StreamMetadata::empty(now)),
    }
}

fn discard(txn: &mut dyn Transaction) -> Result<()> {
    if txn.is_active() {
        txn.rollback()?;
    }
    Ok(())
}

/// Take the writer lock on `stream`, bumping its version; returns the
/// metadata as committed.
///
/// Conflicts are retried without limit. A fresh lock held by another session
/// fails with `WriteLocked`; a stale one is seized. The committed metadata
/// records the session's starting position: the previous end of the stream
/// for [`OpenMode::Append`], zero for [`OpenMode::Truncate`].
pub(crate) fn acquire(
    store: &dyn EntityStore,
    stream: &str,
    mode: OpenMode,
    lock_timeout: Duration,
) -> Result<StreamMetadata> {
    let mut attempt = 0u64;

    loop {
        attempt += 1;
        let now = unix_millis();
        let mut txn = store.begin_transaction()?;

        let mut metadata = match read_in(txn.as_mut(), stream, now) {
            Ok(metadata) => metadata,
            Err(e) => {
                discard(txn.as_mut())?;
                return Err(e);
            }
        };

        if metadata.is_lock_fresh(now, lock_timeout) {
            discard(txn.as_mut())?;
            return Err(PagedKvError::WriteLocked(stream.to_string()));
        }
        if metadata.locked {
            tracing::warn!(
                stream,
                version = metadata.version,
                held_since = metadata.updated_at,
                "seizing stale writer lock"
            );
        }

        let first_session = metadata.version == 0 && metadata.updated_at == metadata.created_at;
        metadata.version += 1;
        if !first_session {
            metadata.updated_at = now;
        }
        metadata.locked = true;
        if mode == OpenMode::Truncate {
            metadata.page_count = 0;
            metadata.cursor = 0;
        }

        txn.put(metadata.to_entity(stream))?;
        match txn.commit() {
            Ok(()) => {
                tracing::debug!(stream, version = metadata.version, ?mode, attempt, "writer lock acquired");
                return Ok(metadata);
            }
            Err(e) if e.is_conflict() => {
                discard(txn.as_mut())?;
                tracing::debug!(stream, attempt, "writer lock conflict, retrying");
            }
            Err(e) => {
                discard(txn.as_mut())?;
                return Err(e);
            }
        }
    }
}

/// Release the lock taken by session `version`, recording the stream's new
/// end position.
///
/// Returns `false` without touching the record when the session no longer
/// owns the lock (it was seized, or already released).
pub(crate) fn release(
    store: &dyn EntityStore,
    stream: &str,
    version: u64,
    page_count: u64,
    cursor: usize,
) -> Result<bool> {
    loop {
        let now = unix_millis();
        let mut txn = store.begin_transaction()?;

        let mut metadata = match read_in(txn.as_mut(), stream, now) {
            Ok(metadata) => metadata,
            Err(e) => {
                discard(txn.as_mut())?;
                return Err(e);
            }
        };

        if !metadata.locked || metadata.version != version {
            discard(txn.as_mut())?;
            tracing::warn!(
                stream,
                session = version,
                current = metadata.version,
                "writer lock lost, close leaves metadata untouched"
            );
            return Ok(false);
        }

        metadata.page_count = page_count;
        metadata.cursor = cursor;
        metadata.updated_at = now;
        metadata.locked = false;

        txn.put(metadata.to_entity(stream))?;
        match txn.commit() {
            Ok(()) => {
                tracing::debug!(stream, version, page_count, cursor, "writer lock released");
                return Ok(true);
            }
            // Someone touched the record; the next pass sees who owns it
            Err(e) if e.is_conflict() => discard(txn.as_mut())?,
            Err(e) => {
                discard(txn.as_mut())?;
                return Err(e);
            }
        }
    }
}
