//! UTF-8 text over paged streams.

use std::fmt;
use std::io::{BufRead, BufReader, Read};

use crate::error::{PagedKvError, Result};

use super::{PagedStreamReader, PagedStreamWriter};

/// Writes UTF-8 text to a stream
pub struct StreamTextWriter {
    inner: PagedStreamWriter,
}

impl StreamTextWriter {
    pub fn new(inner: PagedStreamWriter) -> Self {
        Self { inner }
    }

    pub fn write_str(&mut self, text: &str) -> Result<()> {
        self.inner.write_bytes(text.as_bytes())
    }

    /// Write `line` followed by `\n`
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_bytes(line.as_bytes())?;
        self.inner.write_bytes(b"\n")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush_page()
    }

    pub fn close(self) -> Result<()> {
        self.inner.close()
    }

    pub fn get_ref(&self) -> &PagedStreamWriter {
        &self.inner
    }

    pub fn into_inner(self) -> PagedStreamWriter {
        self.inner
    }
}

impl fmt::Write for StreamTextWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        StreamTextWriter::write_str(self, s).map_err(|e| {
            tracing::debug!(stream = %self.inner.name(), error = %e, "text write failed");
            fmt::Error
        })
    }
}

/// Reads UTF-8 text from a stream
///
/// Invalid UTF-8 surfaces as an `Io` error of kind `InvalidData`.
pub struct StreamTextReader {
    inner: BufReader<PagedStreamReader>,
}

impl StreamTextReader {
    pub fn new(inner: PagedStreamReader) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Append the next line, terminator included, to `line`; returns the
    /// number of bytes read (`0` at end of stream)
    pub fn read_line(&mut self, line: &mut String) -> Result<usize> {
        Ok(self.inner.read_line(line)?)
    }

    /// Remaining lines, without terminators
    pub fn lines(self) -> impl Iterator<Item = Result<String>> {
        self.inner.lines().map(|line| line.map_err(PagedKvError::from))
    }

    /// Read everything left
    pub fn read_to_string(&mut self) -> Result<String> {
        let mut text = String::new();
        self.inner.read_to_string(&mut text)?;
        Ok(text)
    }

    pub fn get_ref(&self) -> &PagedStreamReader {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> PagedStreamReader {
        self.inner.into_inner()
    }
}
