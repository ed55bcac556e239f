//! Journal Reader
//!
//! Handles reading entries from the journal file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{PagedKvError, Result};

use super::entry::parse_header;
use super::{JournalEntry, HEADER_SIZE};

/// Reads entries from the journal file
pub struct JournalReader {
    reader: BufReader<File>,
    position: u64,
}

impl JournalReader {
    /// Open a journal file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry.
    ///
    /// Returns `Ok(None)` at a clean end of file and `JournalCorruption` for a
    /// torn or damaged frame. `position()` is only advanced past valid frames.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let filled = read_up_to(&mut self.reader, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        let (lsn, crc, len) = parse_header(&header[..filled])?;

        let mut data = vec![0u8; len as usize];
        let got = read_up_to(&mut self.reader, &mut data)?;
        if got < data.len() {
            return Err(PagedKvError::JournalCorruption(format!(
                "frame at offset {} truncated: {} of {} data bytes",
                self.position,
                got,
                data.len()
            )));
        }

        let entry = JournalEntry::from_parts(lsn, crc, len, &data)?;
        self.position += (HEADER_SIZE + data.len()) as u64;
        Ok(Some(entry))
    }

    /// Byte offset just past the last valid frame read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over entries, stopping after the first error
    pub fn entries(self) -> JournalIterator {
        JournalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over journal entries
pub struct JournalIterator {
    reader: JournalReader,
    done: bool,
}

impl Iterator for JournalIterator {
    type Item = Result<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill as much of `buf` as the file allows
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
