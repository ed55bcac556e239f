//! Stream Writer
//!
//! Buffers bytes into the current page and persists pages as they fill.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::config::Config;
use crate::error::{PagedKvError, Result};
use crate::store::EntityStore;
use crate::unix_millis;

use super::metadata::{self, StreamMetadata};
use super::page::Page;
use super::{check_name, OpenMode};

/// One writer session on a paged stream
///
/// Opening takes the stream's writer lock (see [`OpenMode`] for where the
/// session starts). Bytes collect in a page buffer whose capacity starts at
/// `Config::initial_buffer_size` and doubles up to `Config::page_size`; a
/// full page is persisted when the next byte arrives or on `flush()`.
///
/// `close()` flushes and releases the lock, publishing the new length to
/// readers. Dropping an open writer closes it best-effort.
pub struct PagedStreamWriter {
    store: Arc<dyn EntityStore>,
    name: String,
    page_size: usize,
    lock_timeout: Duration,

    /// Metadata as committed when the lock was taken
    session: StreamMetadata,

    page_index: u64,
    buffer: BytesMut,
    capacity: usize,

    /// Position `(page, cursor)` of the last persisted byte boundary
    last_flush: (u64, usize),
    closed: bool,
}

impl PagedStreamWriter {
    /// Open `stream` for writing from offset zero
    pub fn create(store: Arc<dyn EntityStore>, stream: &str, config: &Config) -> Result<Self> {
        Self::open(store, stream, OpenMode::Truncate, config)
    }

    /// Open `stream` for writing after its last committed byte
    pub fn append(store: Arc<dyn EntityStore>, stream: &str, config: &Config) -> Result<Self> {
        Self::open(store, stream, OpenMode::Append, config)
    }

    /// Take the writer lock on `stream`.
    ///
    /// Fails with `WriteLocked` while another session holds a fresh lock.
    pub fn open(
        store: Arc<dyn EntityStore>,
        stream: &str,
        mode: OpenMode,
        config: &Config,
    ) -> Result<Self> {
        check_name(stream)?;
        config.validate()?;

        let session = metadata::acquire(store.as_ref(), stream, mode, config.lock_timeout)?;
        let page_index = session.page_count;

        let tail = match load_tail(store.as_ref(), stream, &session, config.page_size) {
            Ok(tail) => tail,
            Err(e) => {
                // Nothing will own the lock; hand it back before failing
                if let Err(release_err) = metadata::release(
                    store.as_ref(),
                    stream,
                    session.version,
                    session.page_count,
                    session.cursor,
                ) {
                    tracing::warn!(stream, error = %release_err, "releasing lock after failed open");
                }
                return Err(e);
            }
        };
        let cursor = tail.len();

        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&tail);

        let mut capacity = config.initial_buffer_size.min(config.page_size);
        while capacity < buffer.len() {
            capacity = (capacity * 2).min(config.page_size);
        }
        buffer.reserve(capacity - buffer.len());

        Ok(Self {
            store,
            name: stream.to_string(),
            page_size: config.page_size,
            lock_timeout: config.lock_timeout,
            session,
            page_index,
            buffer,
            capacity,
            last_flush: (page_index, cursor),
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version of this session; every page it flushes carries it
    pub fn version(&self) -> u64 {
        self.session.version
    }

    /// Bytes of the stream up to the current write position
    pub fn position(&self) -> u64 {
        self.page_index * self.page_size as u64 + self.buffer.len() as u64
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether this session's own lock is still within its timeout
    pub fn holds_lock(&self) -> bool {
        !self.closed && self.session.is_lock_fresh(unix_millis(), self.lock_timeout)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.holds_lock() {
            Ok(())
        } else {
            Err(PagedKvError::StreamClosed(self.name.clone()))
        }
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.buffer.len() + additional;
        if needed <= self.capacity {
            return;
        }
        while self.capacity < needed {
            self.capacity = (self.capacity * 2).min(self.page_size);
        }
        self.buffer.reserve(self.capacity - self.buffer.len());
    }

    /// Append all of `data` to the stream.
    ///
    /// Fails with `StreamClosed` once the writer is closed or its lock has
    /// outlived the timeout.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;

        let mut rest = data;
        while !rest.is_empty() {
            if self.buffer.len() == self.page_size {
                self.flush_page()?;
            }
            let n = rest.len().min(self.page_size - self.buffer.len());
            self.grow_for(n);
            self.buffer.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Persist the current page if anything changed since the last flush.
    /// A full page is then left behind and writing continues on the next one.
    ///
    /// Fails with `StreamClosed` when there is something to persist but the
    /// lock is no longer held.
    pub fn flush_page(&mut self) -> Result<()> {
        if (self.page_index, self.buffer.len()) != self.last_flush {
            self.ensure_writable()?;

            let page = Page {
                data: Bytes::copy_from_slice(&self.buffer),
                version: self.session.version,
            };
            self.store.put(page.to_entity(&self.name, self.page_index))?;
            tracing::debug!(
                stream = %self.name,
                page = self.page_index,
                len = page.data.len(),
                version = page.version,
                "page flushed"
            );
        }

        if self.buffer.len() == self.page_size {
            self.page_index += 1;
            self.buffer.clear();
        }
        self.last_flush = (self.page_index, self.buffer.len());
        Ok(())
    }

    /// Flush pending bytes and release the lock.
    ///
    /// A writer whose lock has expired persists nothing more: its buffered
    /// bytes are dropped. If another session seized the lock the metadata is
    /// left as the new owner wrote it; otherwise the stream ends after the
    /// last page this session flushed.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.holds_lock() {
            self.flush_page()?;
        } else {
            let (_, flushed) = self.last_flush;
            tracing::warn!(
                stream = %self.name,
                version = self.session.version,
                dropped = self.buffer.len().saturating_sub(flushed),
                "writer lock expired, buffered bytes dropped"
            );
        }
        self.closed = true;

        let (page_count, cursor) = self.last_flush;
        metadata::release(self.store.as_ref(), &self.name, self.session.version, page_count, cursor)?;
        Ok(())
    }
}

/// Committed bytes of the tail page the session resumes; bytes past the
/// cursor belong to a session that never closed
fn load_tail(
    store: &dyn EntityStore,
    stream: &str,
    session: &StreamMetadata,
    page_size: usize,
) -> Result<Bytes> {
    if session.cursor == 0 {
        return Ok(Bytes::new());
    }
    match store.get(&Page::key(stream, session.page_count))? {
        Some(entity) => {
            let page = Page::from_entity(&entity)?;
            let cursor = session.cursor.min(page.data.len()).min(page_size);
            Ok(page.data.slice(..cursor))
        }
        None => {
            tracing::warn!(stream, page = session.page_count, "tail page missing, resuming at its start");
            Ok(Bytes::new())
        }
    }
}

impl io::Write for PagedStreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_page()?)
    }
}

impl Drop for PagedStreamWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(stream = %self.name, error = %e, "closing writer on drop failed");
        }
    }
}
