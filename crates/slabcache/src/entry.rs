//! Entry payload slots, locked handles and payload teardown

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};

use crate::policy::{HashValue, Policy};

/// Key and value of one record.
///
/// The key is immutable once inserted and is read without locking. The
/// value sits behind the entry lock: shared for readers, exclusive for
/// writers and for destruction.
pub(crate) struct Entry<K, V> {
    pub key: K,
    pub value: Arc<RwLock<V>>,
}

/// Entry storage shared between a shard and outstanding handles
pub(crate) type Slot<K, V> = Arc<Entry<K, V>>;

pub(crate) fn new_slot<K, V>(key: K, value: V) -> Slot<K, V> {
    Arc::new(Entry {
        key,
        value: Arc::new(RwLock::new(value)),
    })
}

/// How a looked-up entry should be locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Shared lock; many readers at once
    Read,
    /// Exclusive lock; permits `EntryRef::value_mut`
    Write,
}

impl Access {
    /// `Write` when `want_write` is set, `Read` otherwise
    pub fn from_want_write(want_write: bool) -> Self {
        if want_write {
            Access::Write
        } else {
            Access::Read
        }
    }
}

enum Lock<V> {
    Read(ArcRwLockReadGuard<RawRwLock, V>),
    Write(ArcRwLockWriteGuard<RawRwLock, V>),
}

/// A live entry returned locked by a lookup
///
/// The entry lock is held until the handle is dropped. The shard lock is
/// not held, so other keys in the same shard stay available, but:
///
/// - do not insert, remove or resize through the same cache while holding
///   a handle; if that operation needs this entry exclusively it waits for
///   the handle and the thread deadlocks on itself
/// - do not look up the same key again from the same thread before
///   dropping the handle
///
/// The handle borrows the cache, so the cache cannot be torn down while
/// it exists.
pub struct EntryRef<'a, K, V> {
    hash: HashValue,
    // Released before `entry` so a destroyer that sees the entry unshared
    // also sees the value unshared.
    lock: Lock<V>,
    entry: Slot<K, V>,
    _cache: PhantomData<&'a ()>,
}

impl<'a, K, V> EntryRef<'a, K, V> {
    pub(crate) fn acquire(hash: HashValue, slot: &Slot<K, V>, access: Access) -> Self {
        let lock = match access {
            Access::Read => Lock::Read(slot.value.read_arc()),
            Access::Write => Lock::Write(slot.value.write_arc()),
        };
        Self {
            hash,
            lock,
            entry: Arc::clone(slot),
            _cache: PhantomData,
        }
    }

    /// Hash the entry was stored under
    pub fn hash(&self) -> HashValue {
        self.hash
    }

    /// Key stored with the entry; this is the key object handed to the
    /// insert that created it
    pub fn key(&self) -> &K {
        &self.entry.key
    }

    /// Whether the entry is held exclusively
    pub fn is_write(&self) -> bool {
        matches!(self.lock, Lock::Write(_))
    }

    /// Whether both handles lock the same stored entry
    pub fn same_entry(&self, other: &EntryRef<'_, K, V>) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }

    /// Borrow the value
    pub fn value(&self) -> &V {
        match &self.lock {
            Lock::Read(guard) => &**guard,
            Lock::Write(guard) => &**guard,
        }
    }

    /// Mutably borrow the value; `None` for read handles
    ///
    /// If the mutation changes the value's size, report the difference
    /// with `Cache::update_space_used` after dropping the handle.
    pub fn value_mut(&mut self) -> Option<&mut V> {
        match &mut self.lock {
            Lock::Read(_) => None,
            Lock::Write(guard) => Some(&mut **guard),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for EntryRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("hash", &self.hash)
            .field("key", self.key())
            .field("write", &self.is_write())
            .field("value", self.value())
            .finish()
    }
}

/// Destroy an entry unlinked from its shard.
///
/// Waits for every outstanding handle on the entry to be dropped, then runs
/// the policy's delete hooks. Must not be called with a shard lock held.
pub(crate) fn destroy<P: Policy>(policy: &P, slot: Slot<P::Key, P::Value>) {
    // Once the entry is unlinked no new handle can appear; an exclusive
    // acquisition means every existing one has released its lock.
    drop(slot.value.write());
    let entry = unwrap_shared(slot);
    let value = unwrap_shared(entry.value).into_inner();

    policy.mark_deleted(&entry.key);
    policy.destroy_key(entry.key);
    policy.destroy_value(value);
}

/// Destroy an entry during teardown, when no handle can be outstanding.
///
/// An entry still shared here was leaked by a forgotten handle; it is left
/// to the last owner instead of blocking forever.
pub(crate) fn destroy_unshared<P: Policy>(policy: &P, slot: Slot<P::Key, P::Value>) {
    let Some(entry) = Arc::into_inner(slot) else {
        return;
    };
    policy.mark_deleted(&entry.key);
    policy.destroy_key(entry.key);
    if let Some(lock) = Arc::into_inner(entry.value) {
        policy.destroy_value(lock.into_inner());
    }
}

/// Spin until a handle that already unlocked has also dropped its `Arc`.
fn unwrap_shared<T>(mut shared: Arc<T>) -> T {
    loop {
        match Arc::try_unwrap(shared) {
            Ok(inner) => return inner,
            Err(still_shared) => {
                shared = still_shared;
                thread::yield_now();
            }
        }
    }
}
