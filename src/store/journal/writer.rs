//! Journal Writer
//!
//! Handles appending entries to the journal file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::JournalSync;
use crate::error::{PagedKvError, Result};

use super::{JournalEntry, Mutation};

/// Appends committed mutation sets to the journal file
pub struct JournalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_lsn: u64,
    sync: JournalSync,
    unsynced: usize,
}

impl JournalWriter {
    /// Open or create a journal file, starting at LSN 1
    pub fn open(path: &Path, sync: JournalSync) -> Result<Self> {
        Self::resume(path, sync, 1)
    }

    /// Open a journal for appending after entries up to `next_lsn - 1`
    pub fn resume(path: &Path, sync: JournalSync, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn,
            sync,
            unsynced: 0,
        })
    }

    /// Append one mutation set, returning its LSN
    pub fn append(&mut self, mutations: Vec<Mutation>) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = JournalEntry::new(lsn, mutations).serialize()?;

        self.writer
            .write_all(&frame)
            .map_err(|e| PagedKvError::JournalWrite(format!("lsn {}: {}", lsn, e)))?;
        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync {
            JournalSync::EveryWrite => true,
            JournalSync::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        } else {
            self.writer.flush()?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard every entry (LSNs keep increasing)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(0)?;
        self.writer.get_ref().sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if self.unsynced > 0 {
            if let Err(e) = self.sync() {
                tracing::warn!(path = %self.path.display(), error = %e, "journal sync on drop failed");
            }
        }
    }
}
