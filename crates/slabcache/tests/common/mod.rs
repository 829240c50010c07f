//! Shared test policy mirroring a resolver-style record cache.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use slabcache::{HashValue, Policy};

/// Flat charge for every record.
pub const RECORD_SIZE: usize = 100;

/// Key compared by `id` only; `serial` tells apart key objects with equal ids.
#[derive(Debug, Clone)]
pub struct TestKey {
    pub id: u32,
    pub serial: u64,
}

/// Value carrying a serial so a lookup can prove which insert it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestData {
    pub serial: u64,
}

/// Counts every key and value handed to the cache and every one destroyed.
#[derive(Default)]
pub struct Ledger {
    next_serial: AtomicU64,
    pub keys_created: AtomicUsize,
    pub values_created: AtomicUsize,
    pub keys_destroyed: AtomicUsize,
    pub values_destroyed: AtomicUsize,
    pub marked: AtomicUsize,
    pub destroyed_key_serials: Mutex<Vec<u64>>,
}

impl Ledger {
    pub fn key(&self, id: u32) -> TestKey {
        self.keys_created.fetch_add(1, AtomicOrdering::SeqCst);
        TestKey {
            id,
            serial: self.next_serial.fetch_add(1, AtomicOrdering::SeqCst),
        }
    }

    /// Key used only for comparison; never handed to the cache.
    pub fn lookup_key(&self, id: u32) -> TestKey {
        TestKey { id, serial: u64::MAX }
    }

    pub fn data(&self) -> TestData {
        self.values_created.fetch_add(1, AtomicOrdering::SeqCst);
        TestData {
            serial: self.next_serial.fetch_add(1, AtomicOrdering::SeqCst),
        }
    }

    pub fn keys_destroyed(&self) -> usize {
        self.keys_destroyed.load(AtomicOrdering::SeqCst)
    }

    pub fn values_destroyed(&self) -> usize {
        self.values_destroyed.load(AtomicOrdering::SeqCst)
    }

    /// Every key and value given to the cache has been destroyed exactly once.
    pub fn assert_balanced(&self) {
        assert_eq!(
            self.keys_created.load(AtomicOrdering::SeqCst),
            self.keys_destroyed()
        );
        assert_eq!(
            self.values_created.load(AtomicOrdering::SeqCst),
            self.values_destroyed()
        );
    }
}

/// Policy sharing a ledger with the test body.
#[derive(Clone, Default)]
pub struct TestPolicy {
    pub ledger: Arc<Ledger>,
}

impl Policy for TestPolicy {
    type Key = TestKey;
    type Value = TestData;

    fn size_of(&self, _key: &TestKey, _value: &TestData) -> usize {
        RECORD_SIZE
    }

    fn compare(&self, a: &TestKey, b: &TestKey) -> Ordering {
        a.id.cmp(&b.id)
    }

    fn destroy_key(&self, key: TestKey) {
        self.ledger.keys_destroyed.fetch_add(1, AtomicOrdering::SeqCst);
        self.ledger.destroyed_key_serials.lock().push(key.serial);
    }

    fn destroy_value(&self, _value: TestData) {
        self.ledger
            .values_destroyed
            .fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn mark_deleted(&self, _key: &TestKey) {
        self.ledger.marked.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

/// Deliberately poor hash: only the low four id bits survive, copied into
/// the top bits so collisions hit both shard and bucket selection.
pub fn weak_hash(id: u32) -> HashValue {
    let h = id & 0x0f;
    h | (h << 28)
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
