//! Lock-striped cache: routes every operation to one independently locked shard

use std::mem;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::entry::{self, Access, EntryRef, Slot};
use crate::error::{Error, Result};
use crate::policy::{HashValue, Policy};
use crate::shard::{Inserted, Shard};
use crate::stats::{CacheStats, CacheStatus};

type ShardOf<P> = Shard<<P as Policy>::Key, <P as Policy>::Value>;
type SlotOf<P> = Slot<<P as Policy>::Key, <P as Policy>::Value>;

/// Thread-safe, memory-bounded LRU cache. Share across threads via `Arc<Cache<P>>`.
///
/// The caller supplies the hash of every key. The high bits of the hash
/// select a shard, the low bits select a bucket inside it, so the two
/// choices stay independent.
///
/// Each shard is guarded by its own structural lock; each entry has its own
/// reader/writer lock. Structural locks are always taken before entry locks,
/// and entries are destroyed only after the structural lock is released.
pub struct Cache<P: Policy> {
    /// Sharded storage, each behind its structural lock
    shards: Vec<Mutex<ShardOf<P>>>,

    /// Sizing, comparison and teardown callbacks plus their context
    policy: P,

    /// Activity counters
    stats: CacheStats,

    /// Right shift that brings the shard-selecting bits down
    shard_shift: u32,

    /// Parameters the cache was built with
    config: CacheConfig,
}

impl<P: Policy> Cache<P> {
    /// Create a cache from a validated configuration
    ///
    /// # Arguments
    /// * `config` - Shard count, initial buckets per shard and total budget
    /// * `policy` - Callbacks used for every entry for the cache's lifetime
    ///
    /// # Returns
    /// * `Result<Cache<P>>` - `Error::InvalidConfig` if a parameter is rejected
    pub fn new(config: CacheConfig, policy: P) -> Result<Self> {
        config.validate()?;

        let shards = config
            .shard_budgets()
            .into_iter()
            .map(|budget| Mutex::new(Shard::new(config.buckets, budget)))
            .collect();

        debug!(
            shards = config.shards,
            buckets = config.buckets,
            max_bytes = config.max_bytes,
            "created cache"
        );

        Ok(Self {
            shards,
            policy,
            stats: CacheStats::new(),
            shard_shift: HashValue::BITS - config.shards.trailing_zeros(),
            config,
        })
    }

    /// Create a cache from individual parameters
    ///
    /// # Arguments
    /// * `shards` - Number of shards, a power of two
    /// * `buckets` - Initial bucket count per shard, a power of two
    /// * `max_bytes` - Total budget, divided evenly across shards
    /// * `policy` - Callbacks used for every entry
    pub fn create(shards: usize, buckets: usize, max_bytes: usize, policy: P) -> Result<Self> {
        Self::new(
            CacheConfig {
                shards,
                buckets,
                max_bytes,
            },
            policy,
        )
    }

    /// Insert a record, taking ownership of `key` and `value`
    ///
    /// If the key is already present its entry and stored key are kept, the
    /// supplied key is destroyed and the old value is replaced under the
    /// entry's write lock. Entries are then reclaimed
    /// from the shard's LRU end until it is back within budget.
    ///
    /// Must not be called while this thread holds an `EntryRef` from the
    /// same shard.
    pub fn insert(&self, hash: HashValue, key: P::Key, value: P::Value) {
        let inserted = self
            .shard(hash)
            .lock()
            .insert(&self.policy, hash, key, value);
        self.finish_insert(inserted);
    }

    /// Find a record and return it locked
    ///
    /// A hit marks the entry most recently used. The returned handle holds
    /// the entry lock until dropped; `key` is only used for comparison.
    ///
    /// # Arguments
    /// * `hash` - Hash of `key`
    /// * `key` - Key to compare against
    /// * `access` - Lock the entry for reading or for writing
    ///
    /// # Returns
    /// * `Option<EntryRef>` - The locked entry, or `None` if absent
    pub fn lookup(
        &self,
        hash: HashValue,
        key: &P::Key,
        access: Access,
    ) -> Option<EntryRef<'_, P::Key, P::Value>> {
        let mut shard = self.shard(hash).lock();
        let found = shard
            .lookup(&self.policy, hash, key)
            .map(|slot| EntryRef::acquire(hash, slot, access));
        drop(shard);

        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Insert a record unless its key is present, and return the live entry
    /// locked either way
    ///
    /// When the key already exists the supplied key and value are destroyed.
    /// Returns `None` only if the new record is too large for its shard and
    /// was reclaimed immediately.
    pub fn insert_or_get(
        &self,
        hash: HashValue,
        key: P::Key,
        value: P::Value,
        access: Access,
    ) -> Option<EntryRef<'_, P::Key, P::Value>> {
        let mut shard = self.shard(hash).lock();

        let existing = shard
            .lookup(&self.policy, hash, &key)
            .map(|slot| EntryRef::acquire(hash, slot, access));
        if let Some(found) = existing {
            drop(shard);
            self.stats.record_hit();
            self.policy.destroy_key(key);
            self.policy.destroy_value(value);
            return Some(found);
        }

        let inserted = shard.insert(&self.policy, hash, key, value);
        let handle = inserted
            .live
            .and_then(|idx| shard.slot(idx))
            .map(|slot| EntryRef::acquire(hash, slot, access));
        drop(shard);

        self.stats.record_miss();
        self.finish_insert(inserted);
        handle
    }

    /// Remove a record; absent keys are ignored
    ///
    /// # Returns
    /// * `bool` - Whether an entry was removed
    pub fn remove(&self, hash: HashValue, key: &P::Key) -> bool {
        let victim = self.shard(hash).lock().remove(&self.policy, hash, key);
        match victim {
            Some(victim) => {
                self.stats.record_removal();
                entry::destroy(&self.policy, victim);
                true
            }
            None => false,
        }
    }

    /// Mark a record most recently used without locking it
    pub fn touch(&self, hash: HashValue, key: &P::Key) -> bool {
        self.shard(hash).lock().touch(&self.policy, hash, key)
    }

    /// Mark a record least recently used, making it the next eviction victim
    pub fn demote(&self, hash: HashValue, key: &P::Key) -> bool {
        self.shard(hash).lock().demote(&self.policy, hash, key)
    }

    /// Report a size change made in place through a write handle
    ///
    /// Call after dropping the handle. Adjusts the record's charge by
    /// `delta` bytes and reclaims if its shard is now over budget.
    ///
    /// # Returns
    /// * `bool` - Whether the record was found
    pub fn update_space_used(&self, hash: HashValue, key: &P::Key, delta: isize) -> bool {
        let evicted = self
            .shard(hash)
            .lock()
            .update_space_used(&self.policy, hash, key, delta);
        match evicted {
            Some(evicted) => {
                self.evict(evicted);
                true
            }
            None => false,
        }
    }

    /// Remove and destroy every record, keeping bucket arrays and budgets
    pub fn clear(&self) {
        let mut removed = 0;
        for shard in &self.shards {
            let victims = shard.lock().clear();
            removed += victims.len();
            self.destroy_all(victims);
        }
        debug!(removed, "cleared cache");
    }

    /// Visit every record, shard by shard, holding each entry's read lock
    ///
    /// The shard being visited is locked for the duration; the callback must
    /// not call back into the cache.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(HashValue, &P::Key, &P::Value),
    {
        for shard in &self.shards {
            let shard = shard.lock();
            for (hash, entry) in shard.iter() {
                f(hash, &entry.key, &*entry.value.read());
            }
        }
    }

    /// Visit every record holding each entry's write lock
    ///
    /// Size changes must be reported afterwards with `update_space_used`.
    pub fn for_each_mut<F>(&self, mut f: F)
    where
        F: FnMut(HashValue, &P::Key, &mut P::Value),
    {
        for shard in &self.shards {
            let shard = shard.lock();
            for (hash, entry) in shard.iter() {
                f(hash, &entry.key, &mut *entry.value.write());
            }
        }
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged to live records
    pub fn bytes_used(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().bytes_used()).sum()
    }

    /// Sum of all shard budgets
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().bytes_max()).sum()
    }

    /// Estimated memory held by the cache, payloads included
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>()
            + self
                .shards
                .iter()
                .map(|shard| shard.lock().memory_usage())
                .sum::<usize>()
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Parameters the cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The policy supplied at creation
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Shard that owns `hash`
    pub fn shard_index(&self, hash: HashValue) -> usize {
        hash.checked_shr(self.shard_shift).unwrap_or(0) as usize & (self.shards.len() - 1)
    }

    /// Snapshot per-shard counts and log them
    ///
    /// # Arguments
    /// * `id` - Label included in the snapshot and the log lines
    pub fn status(&self, id: &str) -> CacheStatus {
        let shards = self
            .shards
            .iter()
            .enumerate()
            .map(|(index, shard)| shard.lock().status(index))
            .collect();
        let status = CacheStatus {
            id: id.to_string(),
            shards,
        };

        info!(
            id,
            shards = status.shards.len(),
            entries = status.entries(),
            bytes_used = status.bytes_used(),
            bytes_max = status.bytes_max(),
            "cache status"
        );
        for shard in &status.shards {
            debug!(
                id,
                shard = shard.index,
                entries = shard.entries,
                buckets = shard.buckets,
                longest_chain = shard.longest_chain,
                bytes_used = shard.bytes_used,
                bytes_max = shard.bytes_max,
                "shard status"
            );
        }
        status
    }

    /// Verify the structural invariants of every shard
    ///
    /// Takes each structural lock in turn and read-locks every entry, so it
    /// must not be called while this thread holds a write handle.
    ///
    /// # Returns
    /// * `Result<()>` - `Error::Corrupted` naming the first failing shard
    pub fn check_invariants(&self) -> Result<()> {
        for (index, shard) in self.shards.iter().enumerate() {
            shard
                .lock()
                .check(&self.policy)
                .map_err(|reason| Error::Corrupted {
                    shard: index,
                    reason,
                })?;
        }
        Ok(())
    }

    fn shard(&self, hash: HashValue) -> &Mutex<ShardOf<P>> {
        &self.shards[self.shard_index(hash)]
    }

    /// Destroy what an insert displaced. Runs with no structural lock held.
    fn finish_insert(&self, inserted: Inserted<P::Key, P::Value>) {
        match inserted.duplicate {
            Some((key, old)) => {
                self.stats.record_update();
                self.policy.destroy_key(key);
                self.policy.destroy_value(old);
            }
            None => self.stats.record_insert(),
        }
        self.evict(inserted.evicted);
    }

    fn evict(&self, victims: Vec<SlotOf<P>>) {
        if victims.is_empty() {
            return;
        }
        self.stats.record_evictions(victims.len());
        self.destroy_all(victims);
    }

    fn destroy_all(&self, victims: Vec<SlotOf<P>>) {
        for slot in victims {
            entry::destroy(&self.policy, slot);
        }
    }
}

impl<P: Policy> Drop for Cache<P> {
    fn drop(&mut self) {
        let mut destroyed = 0;
        for shard in &mut self.shards {
            for slot in shard.get_mut().clear() {
                entry::destroy_unshared(&self.policy, slot);
                destroyed += 1;
            }
        }
        debug!(destroyed, "deleted cache");
    }
}
