//! Front-side block cache
//!
//! A small associative cache of (disk, block) → block contents consulted by
//! the volume driver before any remote fetch. Admission and eviction are
//! driven by a monotonic recency clock stamped on every touch.

use diskspan_proto::{BLOCK_SIZE, Block, NUM_DISKS};
use tracing::debug;

use crate::error::CacheError;

/// Smallest allowed slot count
pub const MIN_ENTRIES: usize = 2;

/// Largest allowed slot count
pub const MAX_ENTRIES: usize = 4096;

/// Victim selection when no empty slot remains.
///
/// `MostRecentlyTouched` evicts the entry with the highest recency stamp and
/// is the stock policy, kept bit-for-bit compatible with the deployed
/// service clients even though it inverts conventional LRU.
/// `LeastRecentlyTouched` is the conventional policy a caller can
/// substitute; nothing in this crate selects it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the entry with the highest recency stamp
    #[default]
    MostRecentlyTouched,
    /// Evict the entry with the lowest recency stamp
    LeastRecentlyTouched,
}

impl EvictionPolicy {
    /// Index of the entry to overwrite; entries must all be valid
    fn victim(self, entries: &[CacheEntry]) -> usize {
        let stamps = entries.iter().map(|e| e.recency).enumerate();
        match self {
            Self::MostRecentlyTouched => stamps.max_by_key(|&(_, r)| r),
            Self::LeastRecentlyTouched => stamps.min_by_key(|&(_, r)| r),
        }
        .map_or(0, |(i, _)| i)
    }
}

/// How an insert found room for the new entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// An empty slot took the entry
    Fresh,
    /// A valid entry was evicted to make room
    Replaced,
}

/// One cache slot
#[derive(Debug, Clone)]
struct CacheEntry {
    valid: bool,
    disk: u8,
    block: u8,
    data: Block,
    recency: u64,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            valid: false,
            disk: 0,
            block: 0,
            data: [0; BLOCK_SIZE],
            recency: 0,
        }
    }

    fn matches(&self, disk: u8, block: u8) -> bool {
        self.valid && self.disk == disk && self.block == block
    }
}

struct CacheState {
    entries: Vec<CacheEntry>,
    clock: u64,
    queries: u64,
    hits: u64,
}

/// Cache observability counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups attempted
    pub queries: u64,
    /// Lookups satisfied locally
    pub hits: u64,
    /// Current slot count
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache; zero before any lookup
    pub fn hit_rate(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.hits as f64 / self.queries as f64
        }
    }
}

/// Front-side cache of recently touched blocks
///
/// Constructed disabled; `create` allocates the slots and `destroy` returns
/// it to the disabled state, indistinguishable from never having been
/// created. While disabled, lookups and inserts fail with `NotInitialized`
/// and the volume driver simply goes remote.
pub struct BlockCache {
    state: Option<CacheState>,
    policy: EvictionPolicy,
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCache {
    /// A disabled cache with the stock eviction policy
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::default())
    }

    /// A disabled cache with an explicit eviction policy
    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            state: None,
            policy,
        }
    }

    /// Allocate `capacity` empty slots and zero all counters.
    ///
    /// Fails with `InvalidCapacity` when the capacity is out of range or
    /// the cache already exists.
    pub fn create(&mut self, capacity: usize) -> Result<(), CacheError> {
        if self.state.is_some() || !(MIN_ENTRIES..=MAX_ENTRIES).contains(&capacity) {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        self.state = Some(CacheState {
            entries: vec![CacheEntry::empty(); capacity],
            clock: 0,
            queries: 0,
            hits: 0,
        });
        Ok(())
    }

    /// Release the slots and return to the disabled state
    pub fn destroy(&mut self) -> Result<(), CacheError> {
        self.state
            .take()
            .map(|_| ())
            .ok_or(CacheError::NotInitialized)
    }

    /// Whether the cache currently holds slots
    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    /// Copy out the cached block for (disk, block), stamping its recency.
    ///
    /// Counts one query, and one hit when the entry is present.
    pub fn lookup(&mut self, disk: u8, block: u8) -> Result<Block, CacheError> {
        let state = self.state.as_mut().ok_or(CacheError::NotInitialized)?;
        state.queries += 1;
        for entry in &mut state.entries {
            if entry.matches(disk, block) {
                state.clock += 1;
                entry.recency = state.clock;
                state.hits += 1;
                return Ok(entry.data);
            }
        }
        Err(CacheError::CacheMiss { disk, block })
    }

    /// Overwrite an existing entry's data; a miss (or a disabled cache) is
    /// a silent no-op — update never inserts.
    pub fn update(&mut self, disk: u8, block: u8, data: &Block) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        for entry in &mut state.entries {
            if entry.matches(disk, block) {
                entry.data = *data;
                state.clock += 1;
                entry.recency = state.clock;
                return;
            }
        }
    }

    /// Admit a block not yet present.
    ///
    /// Prefers an empty slot; with none left, overwrites the victim named
    /// by the eviction policy. Insert is not an upsert — a key already
    /// present fails with `AlreadyPresent` and the stored data is
    /// untouched.
    pub fn insert(
        &mut self,
        disk: u8,
        block: u8,
        data: &Block,
    ) -> Result<InsertOutcome, CacheError> {
        let policy = self.policy;
        let state = self.state.as_mut().ok_or(CacheError::NotInitialized)?;
        if disk >= NUM_DISKS {
            return Err(CacheError::InvalidArgument { disk, block });
        }
        if state.entries.iter().any(|e| e.matches(disk, block)) {
            return Err(CacheError::AlreadyPresent { disk, block });
        }

        let (slot, outcome) = match state.entries.iter().position(|e| !e.valid) {
            Some(free) => (free, InsertOutcome::Fresh),
            None => {
                let victim = policy.victim(&state.entries);
                let old = &state.entries[victim];
                debug!(
                    disk = old.disk,
                    block = old.block,
                    slot = victim,
                    "evicting cached block"
                );
                (victim, InsertOutcome::Replaced)
            }
        };

        state.clock += 1;
        let entry = &mut state.entries[slot];
        entry.valid = true;
        entry.disk = disk;
        entry.block = block;
        entry.data = *data;
        entry.recency = state.clock;
        Ok(outcome)
    }

    /// Change the slot count in place.
    ///
    /// Growth appends empty slots; shrinking discards the tail, cached
    /// blocks included.
    pub fn resize(&mut self, capacity: usize) -> Result<(), CacheError> {
        if !(MIN_ENTRIES..=MAX_ENTRIES).contains(&capacity) {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        let state = self.state.as_mut().ok_or(CacheError::NotInitialized)?;
        state.entries.resize(capacity, CacheEntry::empty());
        Ok(())
    }

    /// Counters for the current instance; zeros when disabled
    pub fn stats(&self) -> CacheStats {
        self.state.as_ref().map_or_else(CacheStats::default, |s| CacheStats {
            queries: s.queries,
            hits: s.hits,
            capacity: s.entries.len(),
        })
    }
}
