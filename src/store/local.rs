//! Local Entity Store
//!
//! Process-local [`EntityStore`] with optimistic transactions, optionally
//! made durable by a journal.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::JournalSync;
use crate::entity::{Entity, EntityKey};
use crate::error::{PagedKvError, Result};

use super::journal::{JournalRecovery, JournalWriter, Mutation};
use super::{EntityIter, EntityStore, Projection, Transaction};

/// Largest entity (key + properties) the store accepts, in bytes
pub const MAX_ENTITY_SIZE: usize = 1024 * 1024;

/// Entities fetched per step of a lazy query
const QUERY_CHUNK: usize = 64;

/// Snapshot of store call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Point reads, inside or outside transactions
    pub gets: u64,
    /// Entities written (direct puts and committed transactional puts)
    pub puts: u64,
    /// Entities deleted (direct, batched and transactional)
    pub deletes: u64,
    /// Successful commits
    pub commits: u64,
    /// Commits rejected with a conflict
    pub conflicts: u64,
    /// Queries started
    pub queries: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    queries: AtomicU64,
}

/// Committed state: entities plus a per-key modification stamp
#[derive(Default)]
struct State {
    entities: BTreeMap<EntityKey, Entity>,
    /// Survives deletes so a delete-then-recreate still conflicts
    stamps: HashMap<EntityKey, u64>,
    next_stamp: u64,
}

impl State {
    fn stamp_of(&self, key: &EntityKey) -> u64 {
        self.stamps.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, mutation: Mutation) {
        self.next_stamp += 1;
        match mutation {
            Mutation::Put(entity) => {
                self.stamps.insert(entity.key().clone(), self.next_stamp);
                self.entities.insert(entity.key().clone(), entity);
            }
            Mutation::Delete(key) => {
                self.stamps.insert(key.clone(), self.next_stamp);
                self.entities.remove(&key);
            }
        }
    }
}

/// An [`EntityStore`] living in this process
///
/// ## Concurrency:
/// - `state`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `journal`: Mutex, only taken while `state` is write-locked
/// - Counters and fault-injection knobs are atomics
pub struct LocalEntityStore {
    state: RwLock<State>,
    journal: Option<Mutex<JournalWriter>>,
    data_dir: Option<PathBuf>,
    counters: Counters,
    failing_commits: AtomicUsize,
    failing_batch_deletes: AtomicUsize,
}

impl LocalEntityStore {
    const JOURNAL_FILENAME: &'static str = "entities.journal";

    /// Create a volatile store
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(State::default()),
            journal: None,
            data_dir: None,
            counters: Counters::default(),
            failing_commits: AtomicUsize::new(0),
            failing_batch_deletes: AtomicUsize::new(0),
        }
    }

    /// Open or create a durable store in `dir`
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Recover the journal (damaged tail is truncated)
    /// 3. Replay recovered mutations into memory
    /// 4. Resume appending after the last valid LSN
    pub fn open(dir: &Path, sync: JournalSync) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let journal_path = dir.join(Self::JOURNAL_FILENAME);

        let mut state = State::default();
        let mut next_lsn = 1;

        if journal_path.exists() {
            let (entries, recovery) = JournalRecovery::recover(&journal_path)?;

            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery.entries_recovered,
                    corrupted = recovery.entries_corrupted,
                    last_lsn = recovery.last_lsn,
                    "journal recovery"
                );
            }

            for entry in entries {
                for mutation in entry.mutations {
                    state.apply(mutation);
                }
            }
            next_lsn = recovery.last_lsn + 1;
        }

        let writer = JournalWriter::resume(&journal_path, sync, next_lsn)?;

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(Mutex::new(writer)),
            data_dir: Some(dir.to_path_buf()),
            counters: Counters::default(),
            failing_commits: AtomicUsize::new(0),
            failing_batch_deletes: AtomicUsize::new(0),
        })
    }

    /// Directory holding the journal, if the store is durable
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Force the journal to disk
    pub fn sync(&self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().sync()?;
        }
        Ok(())
    }

    /// Call counters since creation
    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            gets: c.gets.load(Ordering::SeqCst),
            puts: c.puts.load(Ordering::SeqCst),
            deletes: c.deletes.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            conflicts: c.conflicts.load(Ordering::SeqCst),
            queries: c.queries.load(Ordering::SeqCst),
        }
    }

    /// Make the next `n` commits fail with a conflict (testing aid)
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` batch deletes time out without deleting anything
    /// (testing aid)
    pub fn time_out_next_batch_deletes(&self, n: usize) {
        self.failing_batch_deletes.store(n, Ordering::SeqCst);
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Apply mutations atomically: journal first, then memory
    fn apply_all(&self, state: &mut State, mutations: Vec<Mutation>) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        if let Some(journal) = &self.journal {
            journal.lock().append(mutations.clone())?;
        }
        for mutation in mutations {
            match &mutation {
                Mutation::Put(_) => self.counters.puts.fetch_add(1, Ordering::SeqCst),
                Mutation::Delete(_) => self.counters.deletes.fetch_add(1, Ordering::SeqCst),
            };
            state.apply(mutation);
        }
        Ok(())
    }

    fn check_size(entity: &Entity) -> Result<()> {
        let size = entity.size_hint();
        if size > MAX_ENTITY_SIZE {
            return Err(PagedKvError::Store(format!(
                "entity {} is {} bytes, limit is {}",
                entity.key(),
                size,
                MAX_ENTITY_SIZE
            )));
        }
        Ok(())
    }

    /// Consume one unit of a fault-injection budget
    fn take_fault(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Up to `QUERY_CHUNK` entities of `kind` with names after `after`
    fn fetch_chunk(&self, kind: &str, after: Option<&str>) -> Vec<Entity> {
        let state = self.state.read();
        let start = match after {
            Some(name) => Bound::Excluded(EntityKey::new(kind, name)),
            None => Bound::Included(EntityKey::new(kind, "")),
        };
        state
            .entities
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.kind() == kind)
            .take(QUERY_CHUNK)
            .map(|(_, entity)| entity.clone())
            .collect()
    }
}

impl EntityStore for LocalEntityStore {
    fn get(&self, key: &EntityKey) -> Result<Option<Entity>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().entities.get(key).cloned())
    }

    fn put(&self, entity: Entity) -> Result<()> {
        Self::check_size(&entity)?;
        let mut state = self.state.write();
        self.apply_all(&mut state, vec![Mutation::Put(entity)])
    }

    fn delete(&self, key: &EntityKey) -> Result<()> {
        let mut state = self.state.write();
        if !state.entities.contains_key(key) {
            return Ok(());
        }
        self.apply_all(&mut state, vec![Mutation::Delete(key.clone())])
    }

    fn delete_batch(&self, keys: &[EntityKey]) -> Result<()> {
        if Self::take_fault(&self.failing_batch_deletes) {
            return Err(PagedKvError::StoreTimeout(format!(
                "batch delete of {} keys timed out",
                keys.len()
            )));
        }

        let mut state = self.state.write();
        let mutations = keys
            .iter()
            .filter(|key| state.entities.contains_key(*key))
            .cloned()
            .map(Mutation::Delete)
            .collect();
        self.apply_all(&mut state, mutations)
    }

    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(LocalTransaction {
            store: self,
            observed: HashMap::new(),
            writes: BTreeMap::new(),
            active: true,
        }))
    }

    fn query(&self, kind: &str, projection: Projection) -> Result<EntityIter<'_>> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LocalQuery {
            store: self,
            kind: kind.to_string(),
            projection,
            buffer: VecDeque::new(),
            last_name: None,
            exhausted: false,
        }))
    }

    fn count(&self, kind: &str) -> Result<usize> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        Ok(state
            .entities
            .range(EntityKey::new(kind, "")..)
            .take_while(|(key, _)| key.kind() == kind)
            .count())
    }
}

// =============================================================================
// Transactions
// =============================================================================

struct LocalTransaction<'a> {
    store: &'a LocalEntityStore,
    /// Stamp of every touched key when first touched
    observed: HashMap<EntityKey, u64>,
    /// Buffered writes; `None` is a delete
    writes: BTreeMap<EntityKey, Option<Entity>>,
    active: bool,
}

impl LocalTransaction<'_> {
    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(PagedKvError::TransactionInactive)
        }
    }

    fn observe(&mut self, key: &EntityKey, state: &State) {
        if !self.observed.contains_key(key) {
            self.observed.insert(key.clone(), state.stamp_of(key));
        }
    }
}

impl Transaction for LocalTransaction<'_> {
    fn get(&mut self, key: &EntityKey) -> Result<Option<Entity>> {
        self.ensure_active()?;
        self.store.counters.gets.fetch_add(1, Ordering::SeqCst);

        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }

        let state = self.store.state.read();
        self.observe(key, &state);
        Ok(state.entities.get(key).cloned())
    }

    fn put(&mut self, entity: Entity) -> Result<()> {
        self.ensure_active()?;
        LocalEntityStore::check_size(&entity)?;

        let key = entity.key().clone();
        {
            let state = self.store.state.read();
            self.observe(&key, &state);
        }
        self.writes.insert(key, Some(entity));
        Ok(())
    }

    fn delete(&mut self, key: &EntityKey) -> Result<()> {
        self.ensure_active()?;
        {
            let state = self.store.state.read();
            self.observe(key, &state);
        }
        self.writes.insert(key.clone(), None);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;

        let mut state = self.store.state.write();

        let injected = LocalEntityStore::take_fault(&self.store.failing_commits);
        let stale = self
            .observed
            .iter()
            .find(|(key, stamp)| state.stamp_of(key) != **stamp);

        if injected || stale.is_some() {
            if let Some((key, _)) = stale {
                tracing::debug!(key = %key, "commit conflict");
            }
            // A failed commit leaves the transaction active so the caller can roll back
            self.store.counters.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(PagedKvError::Conflict { attempts: 1 });
        }

        let mutations = std::mem::take(&mut self.writes)
            .into_iter()
            .map(|(key, entity)| match entity {
                Some(entity) => Mutation::Put(entity),
                None => Mutation::Delete(key),
            })
            .collect();
        self.store.apply_all(&mut state, mutations)?;

        self.active = false;
        self.store.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.writes.clear();
        self.observed.clear();
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Lazy query: pulls entities in key-name order, a chunk at a time, so
/// concurrent mutation never invalidates the iterator
struct LocalQuery<'a> {
    store: &'a LocalEntityStore,
    kind: String,
    projection: Projection,
    buffer: VecDeque<Entity>,
    last_name: Option<String>,
    exhausted: bool,
}

impl Iterator for LocalQuery<'_> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let chunk = self.store.fetch_chunk(&self.kind, self.last_name.as_deref());
            if chunk.len() < QUERY_CHUNK {
                self.exhausted = true;
            }
            self.buffer.extend(chunk);
        }

        let entity = self.buffer.pop_front()?;
        self.last_name = Some(entity.key().name().to_string());

        Some(Ok(match self.projection {
            Projection::Full => entity,
            Projection::KeysOnly => entity.into_key_only(),
        }))
    }
}
