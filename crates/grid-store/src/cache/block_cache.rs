//! Fixed-capacity, direct-mapped cache of remote byte blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::types::CacheStats;

/// Bits of a slot key holding the block index.
const BLOCK_INDEX_BITS: u32 = 40;
const BLOCK_INDEX_MASK: u64 = (1 << BLOCK_INDEX_BITS) - 1;

/// Identity of one cached block: the resource it came from and its index
/// within that resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub resource: u64,
    pub index: u64,
}

impl BlockKey {
    pub fn new(resource: u64, index: u64) -> Self {
        Self { resource, index }
    }

    /// The key `n` blocks further into the same resource.
    pub fn offset(self, n: u64) -> Self {
        Self::new(self.resource, self.index.wrapping_add(n))
    }

    /// Composite key used to pick a slot.
    ///
    /// The upper 24 bits fold the resource, the lower 40 bits hold the block
    /// index, so consecutive blocks of one resource land in consecutive
    /// slots. Distinct blocks may share a slot key; slots compare the full
    /// [`BlockKey`].
    pub fn slot_key(&self) -> u64 {
        let folded = (self.resource ^ (self.resource >> 24) ^ (self.resource >> 48)) & 0xff_ffff;
        (folded << BLOCK_INDEX_BITS) | (self.index & BLOCK_INDEX_MASK)
    }
}

/// Key of the block containing `offset` of resource `resource`.
pub fn block_key(resource: u64, offset: u64, block_size: u64) -> BlockKey {
    BlockKey::new(resource, offset / block_size)
}

#[derive(Default)]
struct Slot {
    key: Option<BlockKey>,
    data: Vec<u8>,
}

/// Direct-mapped block cache.
///
/// Slot `key.slot_key() % block_count` holds at most one block; inserting overwrites
/// whatever occupies it. Each slot has its own lock, so writes to different
/// slots never contend and a reader sees either the old block or the new
/// one, never a mix. Blocks are never invalidated: the stores they come from
/// are immutable once written.
pub struct BlockCache {
    block_size: u64,
    slots: Box<[RwLock<Slot>]>,
    hits: AtomicU64,
    misses: AtomicU64,
    entries: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// Create a cache of `block_count` blocks of `block_size` bytes.
    pub fn new(block_size: u64, block_count: usize) -> Result<Self> {
        if block_size == 0 || block_count == 0 {
            return Err(StoreError::Config(format!(
                "block cache needs block_size > 0 and block_count > 0, got {} x {}",
                block_size, block_count
            )));
        }
        let slots = (0..block_count).map(|_| RwLock::new(Slot::default())).collect();
        Ok(Self {
            block_size,
            slots,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            entries: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Create a cache sized by the store configuration.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(config.block_size, config.block_count)
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, key: &BlockKey) -> usize {
        (key.slot_key() % self.slots.len() as u64) as usize
    }

    fn read_slot(&self, index: usize) -> Result<RwLockReadGuard<'_, Slot>> {
        self.slots[index]
            .read()
            .map_err(|_| StoreError::CacheSlotTorn(index))
    }

    fn lookup(&self, key: BlockKey) -> Option<Bytes> {
        let index = self.slot_index(&key);
        match self.read_slot(index) {
            Ok(slot) if slot.key == Some(key) => Some(Bytes::copy_from_slice(&slot.data)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, ?key, "Treating torn cache slot as a miss");
                None
            }
        }
    }

    /// Get the block stored under `key`.
    pub fn get(&self, key: BlockKey) -> Option<Bytes> {
        let block = self.lookup(key);
        if block.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        block
    }

    /// Like [`get`](Self::get) but without touching the statistics.
    pub fn peek(&self, key: BlockKey) -> Option<Bytes> {
        self.lookup(key)
    }

    /// Get `count` consecutive blocks starting at `key`, concatenated.
    ///
    /// All slots are read-locked together, so the result is one consistent
    /// snapshot. Locks are taken in ascending slot order regardless of where
    /// the run wraps around the slot ring. Returns `None` unless every block
    /// is present. A miss is not counted, since callers fall back to
    /// per-block lookups.
    pub fn get_many(&self, key: BlockKey, count: u64) -> Option<Bytes> {
        if count == 0 || count > self.slots.len() as u64 {
            return None;
        }
        let mut wanted: Vec<(usize, usize)> = (0..count as usize)
            .map(|i| (self.slot_index(&key.offset(i as u64)), i))
            .collect();
        wanted.sort_unstable();
        // Two blocks in one slot cannot both be resident
        if wanted.windows(2).any(|w| w[0].0 == w[1].0) {
            return None;
        }

        let mut guards: Vec<Option<RwLockReadGuard<'_, Slot>>> =
            (0..count).map(|_| None).collect();
        for (index, position) in wanted {
            let expected = key.offset(position as u64);
            match self.read_slot(index) {
                Ok(slot) if slot.key == Some(expected) => guards[position] = Some(slot),
                Ok(_) => return None,
                Err(e) => {
                    warn!(error = %e, key = ?expected, "Treating torn cache slot as a miss");
                    return None;
                }
            }
        }

        let mut out = BytesMut::with_capacity((count * self.block_size) as usize);
        for slot in guards.iter().flatten() {
            out.extend_from_slice(&slot.data);
        }
        self.hits.fetch_add(count, Ordering::Relaxed);
        Some(out.freeze())
    }

    /// Store a block under `key`, overwriting the slot's current occupant.
    ///
    /// Data shorter than a block (the tail of a resource) is zero-padded.
    pub fn set(&self, key: BlockKey, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.block_size {
            return Err(StoreError::out_of_range(format!(
                "block of {} bytes exceeds block size {}",
                data.len(),
                self.block_size
            )));
        }
        let index = self.slot_index(&key);
        let lock = &self.slots[index];
        let mut slot = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());

        match slot.key {
            None => {
                self.entries.fetch_add(1, Ordering::Relaxed);
            }
            Some(previous) if previous != key => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {}
        }

        slot.data.clear();
        slot.data.extend_from_slice(data);
        slot.data.resize(self.block_size as usize, 0);
        slot.key = Some(key);
        drop(slot);
        lock.clear_poison();
        Ok(())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.load(Ordering::Relaxed);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries as usize,
            memory_bytes: entries * self.block_size,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
