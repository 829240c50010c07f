//! Cache configuration and builder

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::policy::Policy;

/// Default number of shards
pub const DEFAULT_SHARDS: usize = 4;

/// Default initial bucket count per shard
pub const DEFAULT_BUCKETS: usize = 1024;

/// Upper bound on shards; shard selection uses at most this many high hash bits
pub const MAX_SHARD_BITS: u32 = 16;

/// Fixed parameters of a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of shards, a power of two
    pub shards: usize,
    /// Initial bucket array length per shard, a power of two
    pub buckets: usize,
    /// Total byte budget shared out across shards
    pub max_bytes: usize,
}

impl CacheConfig {
    /// Configuration with default shard and bucket counts
    pub fn new(max_bytes: usize) -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            buckets: DEFAULT_BUCKETS,
            max_bytes,
        }
    }

    /// Check every parameter, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        if !self.shards.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "shards must be a non-zero power of two, got {}",
                self.shards
            )));
        }
        if self.shards.trailing_zeros() > MAX_SHARD_BITS {
            return Err(Error::InvalidConfig(format!(
                "at most {} shards are supported, got {}",
                1usize << MAX_SHARD_BITS,
                self.shards
            )));
        }
        if !self.buckets.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "buckets must be a non-zero power of two, got {}",
                self.buckets
            )));
        }
        if self.max_bytes < self.shards {
            return Err(Error::InvalidConfig(format!(
                "budget of {} bytes cannot be split over {} shards",
                self.max_bytes, self.shards
            )));
        }
        Ok(())
    }

    /// Per-shard budgets: an even split with the remainder handed out one
    /// byte at a time to the first shards, so the sum equals `max_bytes`.
    pub fn shard_budgets(&self) -> Vec<usize> {
        let base = self.max_bytes / self.shards;
        let extra = self.max_bytes % self.shards;
        (0..self.shards)
            .map(|i| base + usize::from(i < extra))
            .collect()
    }
}

impl Default for CacheConfig {
    /// Default shard and bucket counts with a 4 MB budget
    fn default() -> Self {
        Self::new(4 * 1024 * 1024)
    }
}

/// Builder for configuring a Cache.
///
/// # Example
///
/// ```
/// use slabcache::{CacheBuilder, FixedPolicy};
///
/// let cache = CacheBuilder::new(1024 * 1024)
///     .shards(8)
///     .buckets(64)
///     .build(FixedPolicy::<u64, String>::new(32, |v| v.len()))
///     .unwrap();
///
/// assert_eq!(cache.shard_count(), 8);
/// ```
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    /// Create a new builder with the given total budget in bytes.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            config: CacheConfig::new(max_bytes),
        }
    }

    /// Set the number of shards. Must be a power of two.
    ///
    /// More shards reduce contention on the structural locks.
    ///
    /// Default: 4 shards
    pub fn shards(mut self, count: usize) -> Self {
        self.config.shards = count;
        self
    }

    /// Set the initial bucket count per shard. Must be a power of two.
    ///
    /// Shards double their bucket array whenever entries outnumber buckets,
    /// so a small value only costs a few early rehashes.
    ///
    /// Default: 1024 buckets
    pub fn buckets(mut self, count: usize) -> Self {
        self.config.buckets = count;
        self
    }

    /// Configuration as currently set
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Build the cache with the configured settings.
    pub fn build<P: Policy>(self, policy: P) -> Result<Cache<P>> {
        Cache::new(self.config, policy)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }
}
