//! # slabcache
//!
//! Lock-striped, memory-bounded LRU hash table for caching records shared
//! by many threads in one process.
//!
//! ## Architecture
//! - **Cache**: a fixed array of shards; high hash bits choose the shard
//! - **Shard**: resizable bucket table, LRU list and byte budget behind one
//!   structural lock
//! - **Entry**: key plus a value behind its own reader/writer lock
//! - **Policy**: caller callbacks for sizing, comparing and destroying
//!
//! Lock order is always shard first, then entry. Lookups return the entry
//! still locked, with the shard lock already released.
//!
//! ## Example
//!
//! ```
//! use slabcache::{Access, Cache, FixedPolicy, KeyHasher};
//!
//! let hasher = KeyHasher::new();
//! let cache = Cache::create(4, 16, 64 * 1024, FixedPolicy::<String, Vec<u8>>::new(48, |v| v.len()))
//!     .unwrap();
//!
//! let key = "example.com".to_string();
//! let hash = hasher.hash(&key);
//! cache.insert(hash, key.clone(), vec![192, 0, 2, 1]);
//!
//! if let Some(entry) = cache.lookup(hash, &key, Access::Read) {
//!     assert_eq!(entry.value(), &vec![192, 0, 2, 1]);
//! }
//!
//! cache.remove(hash, &key);
//! assert!(cache.lookup(hash, &key, Access::Read).is_none());
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod entry;
mod error;
mod policy;
mod shard;
mod stats;

pub use cache::Cache;
pub use config::{CacheBuilder, CacheConfig, DEFAULT_BUCKETS, DEFAULT_SHARDS, MAX_SHARD_BITS};
pub use entry::{Access, EntryRef};
pub use error::{Error, Result};
pub use policy::{FixedPolicy, HashValue, KeyHasher, Policy};
pub use stats::{CacheStats, CacheStatus, ShardStatus};
