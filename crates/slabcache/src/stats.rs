//! Cache statistics and status snapshots

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for cache activity
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup that found its key
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that did not find its key
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insert of a new key
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insert that replaced the value of an existing key
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record entries reclaimed under budget pressure
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record an explicit removal
    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total inserts of new keys
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Get total value replacements
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Get total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get total explicit removals
    pub fn removals(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.removals.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStatus {
    /// Position of the shard in the cache
    pub index: usize,
    /// Live entries
    pub entries: usize,
    /// Length of the bucket array
    pub buckets: usize,
    /// Bytes charged to live entries
    pub bytes_used: usize,
    /// Budget for this shard
    pub bytes_max: usize,
    /// Longest bucket chain
    pub longest_chain: usize,
}

/// Point-in-time view of every shard
///
/// Shards are sampled one after another, so totals are only exact when
/// nothing else is writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// Label supplied by the caller
    pub id: String,
    /// One entry per shard, in shard order
    pub shards: Vec<ShardStatus>,
}

impl CacheStatus {
    /// Live entries across all shards
    pub fn entries(&self) -> usize {
        self.shards.iter().map(|s| s.entries).sum()
    }

    /// Bytes charged across all shards
    pub fn bytes_used(&self) -> usize {
        self.shards.iter().map(|s| s.bytes_used).sum()
    }

    /// Sum of all shard budgets
    pub fn bytes_max(&self) -> usize {
        self.shards.iter().map(|s| s.bytes_max).sum()
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} shards, {} entries, {}/{} bytes",
            self.id,
            self.shards.len(),
            self.entries(),
            self.bytes_used(),
            self.bytes_max()
        )?;
        for shard in &self.shards {
            writeln!(
                f,
                "  shard {}: {} entries in {} buckets (longest chain {}), {}/{} bytes",
                shard.index,
                shard.entries,
                shard.buckets,
                shard.longest_chain,
                shard.bytes_used,
                shard.bytes_max
            )?;
        }
        Ok(())
    }
}
