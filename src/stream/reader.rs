//! Stream Reader
//!
//! Sequential, version-aware reads over the pages of a stream.

use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::Result;
use crate::store::EntityStore;

use super::check_name;
use super::metadata::{self, StreamMetadata};
use super::page::Page;

/// Sequential reader over a paged stream
///
/// The reader keeps a snapshot of the stream metadata taken at open time and
/// checks every page it loads against the snapshot's version:
///
/// | page version        | outcome                                          |
/// |---------------------|--------------------------------------------------|
/// | equal               | read it                                          |
/// | newer               | refresh the snapshot, then read it if it matches |
/// | older, below length | read it (committed by an earlier session)        |
/// | older, tail page    | read up to the snapshot's cursor                 |
/// | older, past length  | end of stream (stale leftover)                   |
/// | missing or empty    | end of stream                                    |
///
/// End of stream is not final: a later `read` looks again, so a reader can
/// follow a stream that is still being written.
pub struct PagedStreamReader {
    store: Arc<dyn EntityStore>,
    name: String,
    page_size: usize,
    snapshot: StreamMetadata,

    page_index: u64,
    page: Bytes,
    offset: usize,
    loaded: bool,
    closed: bool,
}

impl PagedStreamReader {
    /// Open `stream` for reading from its first byte
    pub fn open(store: Arc<dyn EntityStore>, stream: &str, config: &Config) -> Result<Self> {
        check_name(stream)?;
        config.validate()?;

        let snapshot = metadata::read(store.as_ref(), stream)?;
        tracing::debug!(stream, version = snapshot.version, len = snapshot.len(config.page_size), "reader opened");

        Ok(Self {
            store,
            name: stream.to_string(),
            page_size: config.page_size,
            snapshot,
            page_index: 0,
            page: Bytes::new(),
            offset: 0,
            loaded: false,
            closed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata the reader currently validates pages against
    pub fn snapshot(&self) -> &StreamMetadata {
        &self.snapshot
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.page_index * self.page_size as u64 + self.offset as u64
    }

    /// Bytes left according to the snapshot. Advisory: never refreshes, and
    /// a concurrent writer can make it stale in either direction.
    pub fn available(&self) -> u64 {
        if self.closed {
            return 0;
        }
        self.snapshot.len(self.page_size).saturating_sub(self.position())
    }

    /// Load page `index`, deciding from its version whether it belongs to
    /// the stream. `None` means end of stream.
    fn load_page(&mut self, index: u64) -> Result<Option<Bytes>> {
        loop {
            let Some(entity) = self.store.get(&Page::key(&self.name, index))? else {
                return Ok(None);
            };
            let page = Page::from_entity(&entity)?;
            if page.data.is_empty() {
                return Ok(None);
            }

            if page.version == self.snapshot.version {
                return Ok(Some(page.data));
            }
            if page.version < self.snapshot.version {
                return Ok(self.committed_part(index, page.data));
            }

            // A newer session wrote this page
            self.snapshot = metadata::read(self.store.as_ref(), &self.name)?;
            tracing::debug!(
                stream = %self.name,
                page = index,
                version = self.snapshot.version,
                "snapshot refreshed"
            );
            if page.version >= self.snapshot.version {
                return Ok(Some(page.data));
            }
            // Yet another session started meanwhile; judge the page again
        }
    }

    /// The bytes of an older session's page that the snapshot still counts
    /// as part of the stream
    fn committed_part(&self, index: u64, data: Bytes) -> Option<Bytes> {
        if index < self.snapshot.page_count {
            return Some(data);
        }
        // A later session that wrote nothing leaves the tail page as is
        if index == self.snapshot.page_count && self.snapshot.cursor > 0 {
            return Some(data.slice(..self.snapshot.cursor.min(data.len())));
        }
        None
    }

    /// Make sure unread bytes are available in `self.page`; `false` at end
    /// of stream
    fn fill(&mut self) -> Result<bool> {
        if self.loaded && self.offset < self.page.len() {
            return Ok(true);
        }
        if self.loaded && self.page.len() >= self.page_size {
            self.page_index += 1;
            self.offset = 0;
        }
        // A partial page is reloaded in case the writer extended it

        let index = self.page_index;
        match self.load_page(index)? {
            Some(data) => {
                self.page = data;
                self.loaded = true;
                Ok(self.offset < self.page.len())
            }
            None => {
                self.loaded = false;
                Ok(false)
            }
        }
    }

    /// Read up to `buf.len()` bytes; `0` at end of stream
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Ok(0);
        }

        let mut total = 0;
        while total < buf.len() && self.fill()? {
            let n = (buf.len() - total).min(self.page.len() - self.offset);
            buf[total..total + n].copy_from_slice(&self.page[self.offset..self.offset + n]);
            self.offset += n;
            total += n;
        }
        Ok(total)
    }

    /// Skip up to `n` bytes, returning how many were skipped
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        if self.closed {
            return Ok(0);
        }

        let mut skipped = 0;
        while skipped < n && self.fill()? {
            let step = ((n - skipped) as usize).min(self.page.len() - self.offset);
            self.offset += step;
            skipped += step as u64;
        }
        Ok(skipped)
    }

    /// Release the current page; later reads return end of stream
    pub fn close(&mut self) {
        self.closed = true;
        self.loaded = false;
        self.page = Bytes::new();
    }
}

impl io::Read for PagedStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}
