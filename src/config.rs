//! Configuration for pagedkv
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{PagedKvError, Result};

/// Main configuration shared by maps, streams and the local store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Map Configuration
    // -------------------------------------------------------------------------
    /// Retries after the first attempt when a commit conflicts
    /// (4 retries = 5 attempts in total)
    pub max_retries: usize,

    /// Whether put/remove read and return the previous value
    pub write_mode: WriteMode,

    /// Maximum number of keys removed by one batch delete in `clear()`
    pub delete_batch_size: usize,

    /// Expiration applied to cache entries populated by a cached map
    /// (`None` = entries live until evicted or invalidated)
    pub cache_ttl: Option<Duration>,

    // -------------------------------------------------------------------------
    // Stream Configuration
    // -------------------------------------------------------------------------
    /// Payload capacity of one page record (in bytes)
    pub page_size: usize,

    /// Initial capacity of a writer's page buffer (capped at `page_size`);
    /// doubles up to `page_size`
    pub initial_buffer_size: usize,

    /// How long a writer lock stays fresh after it was taken.
    ///
    /// The timeout is not stored with the stream: each opener judges an
    /// existing lock with its own value, so every process sharing a stream
    /// must use the same timeout.
    pub lock_timeout: Duration,

    // -------------------------------------------------------------------------
    // Local Store Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the journal
    pub journal_sync: JournalSync,
}

/// Whether mutating map operations report the value they replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Transactional read of the old value, returned to the caller
    ReturnPrevious,

    /// Blind write without the extra read; put/remove always return `None`
    FireAndForget,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalSync {
    /// fsync after every commit (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// 1 MiB minus 512 bytes, leaving room for the record envelope
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024 - 512;

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 4,
            write_mode: WriteMode::ReturnPrevious,
            delete_batch_size: 500,
            cache_ttl: None,
            page_size: DEFAULT_PAGE_SIZE,
            initial_buffer_size: 10 * 1024, // 10 KB
            lock_timeout: Duration::from_secs(31),
            journal_sync: JournalSync::EveryNEntries { count: 100 },
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Total number of attempts a retrying operation makes
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Reject settings the paging and batching code cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(PagedKvError::Config("page_size must be positive".to_string()));
        }
        if self.initial_buffer_size == 0 {
            return Err(PagedKvError::Config(
                "initial_buffer_size must be positive".to_string(),
            ));
        }
        if self.delete_batch_size == 0 {
            return Err(PagedKvError::Config(
                "delete_batch_size must be positive".to_string(),
            ));
        }
        if let JournalSync::EveryNEntries { count: 0 } = self.journal_sync {
            return Err(PagedKvError::Config(
                "journal sync interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set how many times a conflicting commit is retried
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set whether put/remove return previous values
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    /// Shorthand for `write_mode(WriteMode::FireAndForget)`
    pub fn fast(self) -> Self {
        self.write_mode(WriteMode::FireAndForget)
    }

    /// Set the batch size used by `clear()`
    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.config.delete_batch_size = size;
        self
    }

    /// Set the cache entry expiration
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = Some(ttl);
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the initial writer buffer size (in bytes)
    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.config.initial_buffer_size = size;
        self
    }

    /// Set the writer lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Set the journal sync strategy
    pub fn journal_sync(mut self, strategy: JournalSync) -> Self {
        self.config.journal_sync = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
