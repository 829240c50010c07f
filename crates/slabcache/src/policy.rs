//! Caller-supplied behavior for sizing, comparing and destroying records

use std::cmp::Ordering;
use std::hash::Hash;
use std::marker::PhantomData;

use ahash::RandomState;

/// Hash value computed by the caller for every key
///
/// The cache never recomputes it. High bits pick the shard, low bits pick
/// the bucket inside the shard.
pub type HashValue = u32;

/// Capability interface fixed for the lifetime of a cache
///
/// The implementing value doubles as the per-cache context: anything the
/// callbacks need (allocators, counters, back references) lives in `self`.
///
/// # Example
///
/// ```
/// use std::cmp::Ordering;
/// use slabcache::Policy;
///
/// struct Names;
///
/// impl Policy for Names {
///     type Key = String;
///     type Value = Vec<u8>;
///
///     fn size_of(&self, key: &String, value: &Vec<u8>) -> usize {
///         key.len() + value.len()
///     }
///
///     fn compare(&self, a: &String, b: &String) -> Ordering {
///         a.cmp(b)
///     }
/// }
/// ```
pub trait Policy: Send + Sync {
    /// Key type owned by the cache once inserted
    type Key: Send + Sync;

    /// Value type owned by the cache once inserted
    type Value: Send + Sync;

    /// Bytes charged against the budget for one record
    fn size_of(&self, key: &Self::Key, value: &Self::Value) -> usize;

    /// Key ordering; `Ordering::Equal` means the keys name the same record
    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;

    /// Release a key the cache no longer needs
    fn destroy_key(&self, key: Self::Key) {
        drop(key);
    }

    /// Release a value the cache no longer needs
    fn destroy_value(&self, value: Self::Value) {
        drop(value);
    }

    /// Called for each record leaving the table, after it is unlinked and
    /// exclusively held, just before its key and value are destroyed
    fn mark_deleted(&self, _key: &Self::Key) {}
}

/// Policy for keys with `Ord` and a fixed per-record charge plus a
/// caller-provided value sizing function
///
/// Handy for tests and for callers that do not need custom destructors.
pub struct FixedPolicy<K, V> {
    overhead: usize,
    value_size: fn(&V) -> usize,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> FixedPolicy<K, V> {
    /// Charge `overhead` bytes per record plus `value_size(value)`
    pub fn new(overhead: usize, value_size: fn(&V) -> usize) -> Self {
        Self {
            overhead,
            value_size,
            _marker: PhantomData,
        }
    }

    /// Charge exactly `overhead` bytes per record
    pub fn flat(overhead: usize) -> Self {
        Self::new(overhead, |_| 0)
    }
}

impl<K, V> Policy for FixedPolicy<K, V>
where
    K: Ord + Send + Sync,
    V: Send + Sync,
{
    type Key = K;
    type Value = V;

    fn size_of(&self, _key: &K, value: &V) -> usize {
        self.overhead + (self.value_size)(value)
    }

    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Deterministic key hasher for callers without their own hash function
///
/// Uses fixed `ahash` seeds so the same key maps to the same shard and
/// bucket across cache instances within one build.
#[derive(Clone)]
pub struct KeyHasher {
    state: RandomState,
}

impl KeyHasher {
    /// Create a hasher with the default seeds
    pub fn new() -> Self {
        Self::with_seed(0x5eed_cafe_f00d_b0a7)
    }

    /// Create a hasher with a caller-chosen seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: RandomState::with_seeds(
                seed,
                seed.rotate_left(17) ^ 0x9e37_79b9_7f4a_7c15,
                seed.rotate_left(31) ^ 0xbf58_476d_1ce4_e5b9,
                seed.rotate_left(47) ^ 0x94d0_49bb_1331_11eb,
            ),
        }
    }

    /// Hash a key down to a `HashValue`, folding both halves so high and
    /// low bits are equally mixed
    pub fn hash<K: Hash + ?Sized>(&self, key: &K) -> HashValue {
        let full = self.state.hash_one(key);
        (full ^ (full >> 32)) as HashValue
    }
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new()
    }
}
