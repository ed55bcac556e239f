//! Paged Byte Streams
//!
//! Unbounded byte streams chunked into fixed-capacity page records, so a
//! stream can outgrow the store's per-entity size limit.
//!
//! ## Layout
//!
//! A stream named `s` is a set of entities of kind `s`:
//!
//! ```text
//! s/m      metadata: page count, tail cursor, version, lock, timestamps
//! s/0      page 0   { data: blob, version }
//! s/1      page 1
//! ...
//! s/a      page 10 (names are lowercase hex)
//! ```
//!
//! ## Sessions
//!
//! Every writer session takes a cooperative lock on the metadata record and
//! bumps its version; each page it flushes is tagged with that version.
//! Readers compare page versions against their metadata snapshot to tell
//! pages of the current session from stale leftovers.
//!
//! The lock is advisory and expires after `Config::lock_timeout`. A writer
//! that stays open past the timeout keeps only the pages it flushed before
//! its lock ran out: further writes and flushes fail with `StreamClosed`,
//! and `close` drops whatever is still buffered. The lock check and the
//! page put are not atomic, so a flush that starts just before expiry can
//! still land after another session seized the lock and overwrite its page.

mod metadata;
mod page;
mod reader;
mod text;
mod writer;

pub use metadata::StreamMetadata;
pub use reader::PagedStreamReader;
pub use text::{StreamTextReader, StreamTextWriter};
pub use writer::PagedStreamWriter;

use crate::config::Config;
use crate::error::{PagedKvError, Result};
use crate::store::{EntityStore, Projection};
use crate::unix_millis;

/// Record name of the metadata entity; page names are hex digits and can
/// never collide with it
pub const METADATA_NAME: &str = "m";

/// How a writer positions itself in an existing stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start at offset zero; the old content disappears when the session
    /// closes
    Truncate,

    /// Continue after the last committed byte
    Append,
}

fn check_name(stream: &str) -> Result<()> {
    if stream.is_empty() {
        return Err(PagedKvError::Config("stream name cannot be empty".to_string()));
    }
    Ok(())
}

/// Committed metadata of `stream`, `None` if it was never written
pub fn stat(store: &dyn EntityStore, stream: &str) -> Result<Option<StreamMetadata>> {
    check_name(stream)?;
    metadata::load(store, stream)
}

/// Delete every record of `stream` in batches of `Config::delete_batch_size`.
///
/// Fails with `WriteLocked` while a writer holds a fresh lock. The check and
/// the deletes are not atomic: a writer opening in between loses its pages.
pub fn delete(store: &dyn EntityStore, stream: &str, config: &Config) -> Result<usize> {
    check_name(stream)?;
    config.validate()?;

    if let Some(metadata) = metadata::load(store, stream)? {
        if metadata.is_lock_fresh(unix_millis(), config.lock_timeout) {
            return Err(PagedKvError::WriteLocked(stream.to_string()));
        }
    }

    let mut batch = Vec::with_capacity(config.delete_batch_size);
    let mut deleted = 0;
    for record in store.query(stream, Projection::KeysOnly)? {
        batch.push(record?.key().clone());
        if batch.len() == config.delete_batch_size {
            store.delete_batch(&batch)?;
            deleted += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        store.delete_batch(&batch)?;
        deleted += batch.len();
    }

    tracing::debug!(stream, deleted, "stream deleted");
    Ok(deleted)
}
