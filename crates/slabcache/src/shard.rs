//! Single hash table shard
//!
//! Entries live in one arena. Bucket chains and the LRU list are indices
//! into that arena, so growth and eviction only rewrite links and never
//! leave one dangling.

use std::cmp::Ordering;
use std::mem;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::entry::{self, Entry, Slot};
use crate::policy::{HashValue, Policy};
use crate::stats::ShardStatus;

/// Arena node: one entry plus its bucket and LRU links
struct Node<K, V> {
    hash: HashValue,
    entry: Slot<K, V>,
    /// Bytes charged for this entry in `bytes_used`
    charge: usize,
    /// Next entry in the same bucket
    chain: Option<usize>,
    /// Neighbor towards the most recently used end
    prev: Option<usize>,
    /// Neighbor towards the least recently used end
    next: Option<usize>,
}

/// Result of an insert, to be destroyed after the shard lock is dropped
pub(crate) struct Inserted<K, V> {
    /// Arena index of the inserted entry, unless it was reclaimed at once
    pub live: Option<usize>,
    /// Rejected duplicate key and the value it replaced
    pub duplicate: Option<(K, V)>,
    /// Entries reclaimed to get back under budget
    pub evicted: Vec<Slot<K, V>>,
}

/// One independently locked hash table with its own LRU list and budget.
///
/// Not thread-safe on its own; the cache wraps each shard in a mutex which
/// serves as the structural lock.
pub(crate) struct Shard<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free_list: Vec<usize>,
    buckets: Vec<Option<usize>>,
    bucket_mask: usize,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    count: usize,
    bytes_used: usize,
    bytes_max: usize,
}

impl<K, V> Shard<K, V> {
    /// Create an empty shard. `buckets` must be a power of two.
    pub fn new(buckets: usize, bytes_max: usize) -> Self {
        debug_assert!(buckets.is_power_of_two());

        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            buckets: vec![None; buckets],
            bucket_mask: buckets - 1,
            head: None,
            tail: None,
            count: 0,
            bytes_used: 0,
            bytes_max,
        }
    }

    /// Find the entry for `key`, mark it most recently used and return it
    /// so the caller can lock it before releasing the shard.
    pub fn lookup<P>(&mut self, policy: &P, hash: HashValue, key: &K) -> Option<&Slot<K, V>>
    where
        P: Policy<Key = K, Value = V>,
    {
        let idx = self.find(policy, hash, key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.entry)
    }

    /// Insert or replace, then grow and reclaim as needed.
    ///
    /// A duplicate keeps the stored entry and its key; the value is swapped
    /// under the entry's write lock so existing handles stay valid.
    pub fn insert<P>(&mut self, policy: &P, hash: HashValue, key: K, value: V) -> Inserted<K, V>
    where
        P: Policy<Key = K, Value = V>,
    {
        let (idx, duplicate) = match self.find(policy, hash, &key) {
            Some(idx) => {
                let mut old = None;
                if let Some(node) = &mut self.nodes[idx] {
                    let size = policy.size_of(&node.entry.key, &value);
                    self.bytes_used = self.bytes_used - node.charge + size;
                    node.charge = size;
                    old = Some(mem::replace(&mut *node.entry.value.write(), value));
                }
                self.move_to_front(idx);
                trace!(hash, "replaced value of existing entry");
                (idx, old.map(|slot| (key, slot)))
            }
            None => {
                let size = policy.size_of(&key, &value);
                let bucket = self.bucket_of(hash);
                let idx = self.alloc_node();
                self.nodes[idx] = Some(Node {
                    hash,
                    entry: entry::new_slot(key, value),
                    charge: size,
                    chain: self.buckets[bucket],
                    prev: None,
                    next: None,
                });
                self.buckets[bucket] = Some(idx);
                self.push_front(idx);
                self.count += 1;
                self.bytes_used += size;
                trace!(hash, size, "inserted new entry");
                (idx, None)
            }
        };

        if self.count > self.buckets.len() {
            self.grow();
        }

        let evicted = self.reclaim();
        Inserted {
            live: self.nodes[idx].is_some().then_some(idx),
            duplicate,
            evicted,
        }
    }

    /// Entry at a live arena index, as reported by `Inserted::live`
    pub fn slot(&self, idx: usize) -> Option<&Slot<K, V>> {
        self.nodes.get(idx)?.as_ref().map(|node| &node.entry)
    }

    /// Unlink the entry for `key`. Absent keys are a no-op.
    pub fn remove<P>(&mut self, policy: &P, hash: HashValue, key: &K) -> Option<Slot<K, V>>
    where
        P: Policy<Key = K, Value = V>,
    {
        let idx = self.find(policy, hash, key)?;
        trace!(hash, "removing entry");
        self.detach(idx)
    }

    /// Mark an entry most recently used without locking it.
    pub fn touch<P>(&mut self, policy: &P, hash: HashValue, key: &K) -> bool
    where
        P: Policy<Key = K, Value = V>,
    {
        match self.find(policy, hash, key) {
            Some(idx) => {
                self.move_to_front(idx);
                true
            }
            None => false,
        }
    }

    /// Mark an entry least recently used so it is the next to be reclaimed.
    pub fn demote<P>(&mut self, policy: &P, hash: HashValue, key: &K) -> bool
    where
        P: Policy<Key = K, Value = V>,
    {
        match self.find(policy, hash, key) {
            Some(idx) => {
                self.move_to_back(idx);
                true
            }
            None => false,
        }
    }

    /// Adjust the charge of one entry after its value was changed in place,
    /// then reclaim. Returns `None` when the key is not present.
    pub fn update_space_used<P>(
        &mut self,
        policy: &P,
        hash: HashValue,
        key: &K,
        delta: isize,
    ) -> Option<Vec<Slot<K, V>>>
    where
        P: Policy<Key = K, Value = V>,
    {
        let idx = self.find(policy, hash, key)?;
        if let Some(node) = &mut self.nodes[idx] {
            let charge = node.charge.saturating_add_signed(delta);
            self.bytes_used = self.bytes_used - node.charge + charge;
            node.charge = charge;
        }
        Some(self.reclaim())
    }

    /// Unlink every entry, keeping the bucket array at its current length.
    pub fn clear(&mut self) -> Vec<Slot<K, V>> {
        let victims = self.nodes.drain(..).flatten().map(|node| node.entry).collect();

        self.free_list.clear();
        self.buckets.iter_mut().for_each(|bucket| *bucket = None);
        self.head = None;
        self.tail = None;
        self.count = 0;
        self.bytes_used = 0;
        victims
    }

    /// Walk live entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            shard: self,
            cursor: self.head,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    pub fn bytes_max(&self) -> usize {
        self.bytes_max
    }

    /// Estimated heap and inline footprint, payload bytes included
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>()
            + self.buckets.capacity() * mem::size_of::<Option<usize>>()
            + self.nodes.capacity() * mem::size_of::<Option<Node<K, V>>>()
            + self.free_list.capacity() * mem::size_of::<usize>()
            + self.count * mem::size_of::<Entry<K, V>>()
            + self.count * mem::size_of::<RwLock<V>>()
            + self.bytes_used
    }

    pub fn status(&self, index: usize) -> ShardStatus {
        let longest_chain = (0..self.buckets.len())
            .map(|bucket| self.chain_len(bucket))
            .max()
            .unwrap_or(0);

        ShardStatus {
            index,
            entries: self.count,
            buckets: self.buckets.len(),
            bytes_used: self.bytes_used,
            bytes_max: self.bytes_max,
            longest_chain,
        }
    }

    /// Verify bucket, LRU and accounting invariants.
    ///
    /// Read-locks every entry to recompute its size, so it must not be
    /// called while this thread holds a write handle from the same shard.
    pub fn check<P>(&self, policy: &P) -> Result<(), String>
    where
        P: Policy<Key = K, Value = V>,
    {
        if self.count > self.buckets.len() {
            return Err(format!(
                "{} entries exceed {} buckets",
                self.count,
                self.buckets.len()
            ));
        }
        if self.bucket_mask != self.buckets.len() - 1 {
            return Err(format!(
                "bucket mask {:#x} does not match length {}",
                self.bucket_mask,
                self.buckets.len()
            ));
        }
        if self.head.is_none() != self.tail.is_none() {
            return Err("lru head and tail disagree on emptiness".to_string());
        }
        if self.bytes_used > self.bytes_max {
            return Err(format!(
                "{} bytes used over budget of {}",
                self.bytes_used, self.bytes_max
            ));
        }

        let live = |idx: usize| self.nodes.get(idx).and_then(Option::as_ref);

        if let Some(node) = self.head.and_then(live) {
            if node.prev.is_some() {
                return Err("lru head has a predecessor".to_string());
            }
        }
        if let Some(node) = self.tail.and_then(live) {
            if node.next.is_some() {
                return Err("lru tail has a successor".to_string());
            }
        }

        let mut seen = 0;
        let mut charged = 0;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = live(idx).ok_or_else(|| format!("lru links to free slot {}", idx))?;
            seen += 1;
            if seen > self.count {
                return Err(format!("lru list longer than {} entries", self.count));
            }
            if let Some(prev) = node.prev {
                if live(prev).and_then(|p| p.next) != Some(idx) {
                    return Err(format!("entry {} and its predecessor disagree", idx));
                }
            }
            if let Some(next) = node.next {
                if live(next).and_then(|n| n.prev) != Some(idx) {
                    return Err(format!("entry {} and its successor disagree", idx));
                }
            } else if self.tail != Some(idx) {
                return Err("lru list ends before the tail".to_string());
            }
            let size = policy.size_of(&node.entry.key, &node.entry.value.read());
            if size != node.charge {
                return Err(format!(
                    "entry {} charged {} bytes but sizes to {}",
                    idx, node.charge, size
                ));
            }
            charged += node.charge;
            cursor = node.next;
        }
        if seen != self.count {
            return Err(format!("lru list has {} of {} entries", seen, self.count));
        }
        if charged != self.bytes_used {
            return Err(format!(
                "entries account for {} bytes but {} are recorded",
                charged, self.bytes_used
            ));
        }

        let mut chained = 0;
        for bucket in 0..self.buckets.len() {
            let mut cursor = self.buckets[bucket];
            while let Some(idx) = cursor {
                let node = live(idx).ok_or_else(|| format!("bucket {} links to free slot", bucket))?;
                if self.bucket_of(node.hash) != bucket {
                    return Err(format!("entry {} chained in wrong bucket {}", idx, bucket));
                }
                chained += 1;
                if chained > self.count {
                    return Err("bucket chains hold more than the entry count".to_string());
                }
                cursor = node.chain;
            }
        }
        if chained != self.count {
            return Err(format!("bucket chains hold {} of {} entries", chained, self.count));
        }

        Ok(())
    }

    fn bucket_of(&self, hash: HashValue) -> usize {
        hash as usize & self.bucket_mask
    }

    fn chain_len(&self, bucket: usize) -> usize {
        let mut len = 0;
        let mut cursor = self.buckets[bucket];
        while let Some(idx) = cursor {
            len += 1;
            cursor = self.nodes[idx].as_ref().and_then(|node| node.chain);
        }
        len
    }

    /// Hash first, then the policy comparison for hash-equal entries.
    fn find<P>(&self, policy: &P, hash: HashValue, key: &K) -> Option<usize>
    where
        P: Policy<Key = K, Value = V>,
    {
        let mut cursor = self.buckets[self.bucket_of(hash)];
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref()?;
            if node.hash == hash && policy.compare(&node.entry.key, key) == Ordering::Equal {
                return Some(idx);
            }
            cursor = node.chain;
        }
        None
    }

    /// Double the bucket array and rechain every entry.
    fn grow(&mut self) {
        let len = self.buckets.len() * 2;
        let mask = len - 1;
        let mut buckets = vec![None; len];

        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if let Some(node) = slot {
                let bucket = node.hash as usize & mask;
                node.chain = buckets[bucket];
                buckets[bucket] = Some(idx);
            }
        }

        debug!(from = self.buckets.len(), to = len, entries = self.count, "grew shard buckets");
        self.buckets = buckets;
        self.bucket_mask = mask;
    }

    /// Evict from the LRU tail until back within budget.
    fn reclaim(&mut self) -> Vec<Slot<K, V>> {
        let mut evicted = Vec::new();
        while self.bytes_used > self.bytes_max {
            let Some(tail) = self.tail else {
                break;
            };
            match self.detach(tail) {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }

        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                bytes_used = self.bytes_used,
                bytes_max = self.bytes_max,
                "reclaimed space"
            );
        }
        evicted
    }

    /// Remove a node from its chain and the LRU list and free its slot.
    fn detach(&mut self, idx: usize) -> Option<Slot<K, V>> {
        self.unlink_chain(idx);
        self.unlink(idx);
        let node = self.nodes[idx].take()?;
        self.free_node(idx);
        self.count -= 1;
        self.bytes_used -= node.charge;
        Some(node.entry)
    }

    fn unlink_chain(&mut self, idx: usize) {
        let (bucket, after) = match &self.nodes[idx] {
            Some(node) => (self.bucket_of(node.hash), node.chain),
            None => return,
        };

        if self.buckets[bucket] == Some(idx) {
            self.buckets[bucket] = after;
            return;
        }

        let mut cursor = self.buckets[bucket];
        while let Some(cur) = cursor {
            let Some(node) = &mut self.nodes[cur] else {
                return;
            };
            if node.chain == Some(idx) {
                node.chain = after;
                return;
            }
            cursor = node.chain;
        }
    }

    fn push_front(&mut self, idx: usize) {
        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn move_to_back(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = self.tail;
            node.next = None;
        }

        if let Some(tail_idx) = self.tail {
            if let Some(tail) = &mut self.nodes[tail_idx] {
                tail.next = Some(idx);
            }
        }

        self.tail = Some(idx);
        if self.head.is_none() {
            self.head = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

/// Most to least recently used walk over a shard
pub(crate) struct Iter<'a, K, V> {
    shard: &'a Shard<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (HashValue, &'a Entry<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let shard = self.shard;
        let node = shard.nodes[idx].as_ref()?;
        self.cursor = node.next;
        Some((node.hash, &*node.entry))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::policy::FixedPolicy;

    const ENTRY: usize = 10;

    fn policy() -> FixedPolicy<u32, u32> {
        FixedPolicy::flat(ENTRY)
    }

    /// Deliberately weak hash so small ids collide in both bucket and shard bits.
    fn weak_hash(id: u32) -> HashValue {
        let h = id & 0x0f;
        h | (h << 28)
    }

    fn value_of(shard: &mut Shard<u32, u32>, id: u32) -> Option<u32> {
        shard
            .lookup(&policy(), weak_hash(id), &id)
            .map(|slot| *slot.value.read())
    }

    fn lru_keys(shard: &Shard<u32, u32>) -> Vec<u32> {
        shard.iter().map(|(_, entry)| entry.key).collect()
    }

    #[test]
    fn test_shard_insert_lookup() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        let inserted = shard.insert(&p, weak_hash(12), 12, 128);
        assert!(inserted.duplicate.is_none());
        let live = inserted.live.unwrap();
        assert_eq!(shard.slot(live).map(|slot| *slot.value.read()), Some(128));
        assert!(inserted.evicted.is_empty());
        shard.insert(&p, weak_hash(14), 14, 129);

        assert_eq!(value_of(&mut shard, 12), Some(128));
        assert_eq!(value_of(&mut shard, 14), Some(129));
        assert_eq!(value_of(&mut shard, 13), None);
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.bytes_used(), 2 * ENTRY);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_hash_collisions() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        // 1 and 17 share a hash; only the comparison tells them apart.
        assert_eq!(weak_hash(1), weak_hash(17));
        shard.insert(&p, weak_hash(1), 1, 100);
        shard.insert(&p, weak_hash(17), 17, 200);

        assert_eq!(value_of(&mut shard, 1), Some(100));
        assert_eq!(value_of(&mut shard, 17), Some(200));
        assert_eq!(shard.len(), 2);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_duplicate_insert() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        shard.insert(&p, weak_hash(5), 5, 1);
        shard.insert(&p, weak_hash(6), 6, 2);
        let before = Arc::clone(shard.lookup(&p, weak_hash(5), &5).unwrap());
        let inserted = shard.insert(&p, weak_hash(5), 5, 3);

        // The stored entry survives; only its value changes.
        let after = shard.lookup(&p, weak_hash(5), &5).unwrap();
        assert!(Arc::ptr_eq(&before, after));

        let (key, old) = inserted.duplicate.unwrap();
        assert_eq!(key, 5);
        assert_eq!(old, 1);
        assert_eq!(shard.len(), 2);
        assert_eq!(value_of(&mut shard, 5), Some(3));
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_duplicate_adjusts_bytes() {
        let p: FixedPolicy<u32, u32> = FixedPolicy::new(10, |v| *v as usize);
        let mut shard = Shard::new(4, 1000);

        shard.insert(&p, 1, 1, 5);
        assert_eq!(shard.bytes_used(), 15);
        shard.insert(&p, 1, 1, 50);
        assert_eq!(shard.bytes_used(), 60);
        shard.insert(&p, 1, 1, 0);
        assert_eq!(shard.bytes_used(), 10);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_remove() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        shard.insert(&p, weak_hash(1), 1, 10);
        shard.insert(&p, weak_hash(17), 17, 20);

        let victim = shard.remove(&p, weak_hash(1), &1).unwrap();
        assert_eq!(victim.key, 1);
        assert_eq!(*victim.value.read(), 10);
        assert_eq!(value_of(&mut shard, 1), None);
        assert_eq!(value_of(&mut shard, 17), Some(20));
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.bytes_used(), ENTRY);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_remove_absent() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);
        shard.insert(&p, weak_hash(1), 1, 10);

        assert!(shard.remove(&p, weak_hash(2), &2).is_none());
        assert!(shard.remove(&p, weak_hash(17), &17).is_none());
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.bytes_used(), ENTRY);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_lru_order() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        for id in 0..4 {
            shard.insert(&p, weak_hash(id), id, id);
        }
        assert_eq!(lru_keys(&shard), vec![3, 2, 1, 0]);

        value_of(&mut shard, 1);
        assert_eq!(lru_keys(&shard), vec![1, 3, 2, 0]);

        shard.insert(&p, weak_hash(0), 0, 99);
        assert_eq!(lru_keys(&shard), vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_shard_eviction() {
        let p = policy();
        let mut shard = Shard::new(4, 5 * ENTRY);

        let mut evicted = Vec::new();
        for id in 0..20 {
            let inserted = shard.insert(&p, weak_hash(id), id, id);
            evicted.extend(inserted.evicted.into_iter().map(|v| v.key));
        }

        assert_eq!(shard.len(), 5);
        assert_eq!(evicted, (0..15).collect::<Vec<_>>());
        assert_eq!(lru_keys(&shard), vec![19, 18, 17, 16, 15]);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_eviction_respects_recency() {
        let p = policy();
        let mut shard = Shard::new(4, 3 * ENTRY);

        shard.insert(&p, weak_hash(1), 1, 1);
        shard.insert(&p, weak_hash(2), 2, 2);
        shard.insert(&p, weak_hash(3), 3, 3);
        value_of(&mut shard, 1);

        let inserted = shard.insert(&p, weak_hash(4), 4, 4);
        let evicted: Vec<_> = inserted.evicted.into_iter().map(|v| v.key).collect();
        assert_eq!(evicted, vec![2]);
        assert_eq!(value_of(&mut shard, 1), Some(1));
    }

    #[test]
    fn test_shard_oversized_entry_evicts_itself() {
        let p: FixedPolicy<u32, u32> = FixedPolicy::new(0, |v| *v as usize);
        let mut shard = Shard::new(4, 100);

        shard.insert(&p, 1, 1, 40);
        let inserted = shard.insert(&p, 2, 2, 500);

        assert_eq!(inserted.evicted.len(), 2);
        assert!(inserted.live.is_none());
        assert_eq!(shard.len(), 0);
        assert_eq!(shard.bytes_used(), 0);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_growth() {
        let p = policy();
        let mut shard = Shard::new(2, 1000);

        for id in 0..9 {
            shard.insert(&p, id * 7919, id, id);
            shard.check(&p).unwrap();
        }

        assert_eq!(shard.status(0).buckets, 16);
        for id in 0..9 {
            let found = shard.lookup(&p, id * 7919, &id).map(|slot| *slot.value.read());
            assert_eq!(found, Some(id));
        }
    }

    #[test]
    fn test_shard_touch_and_demote() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        for id in 0..3 {
            shard.insert(&p, weak_hash(id), id, id);
        }

        assert!(shard.touch(&p, weak_hash(0), &0));
        assert_eq!(lru_keys(&shard), vec![0, 2, 1]);

        assert!(shard.demote(&p, weak_hash(2), &2));
        assert_eq!(lru_keys(&shard), vec![0, 1, 2]);

        assert!(!shard.touch(&p, weak_hash(9), &9));
        assert!(!shard.demote(&p, weak_hash(9), &9));
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_update_space_used() {
        let p: FixedPolicy<u32, u32> = FixedPolicy::new(0, |v| *v as usize);
        let mut shard = Shard::new(4, 100);

        shard.insert(&p, 1, 1, 30);
        shard.insert(&p, 2, 2, 30);

        if let Some(slot) = shard.lookup(&p, 2, &2) {
            *slot.value.write() = 80;
        }
        let evicted = shard.update_space_used(&p, 2, &2, 50).unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, 1);
        assert_eq!(shard.bytes_used(), 80);
        assert!(shard.update_space_used(&p, 9, &9, 1).is_none());
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_clear() {
        let p = policy();
        let mut shard = Shard::new(2, 1000);

        for id in 0..10 {
            shard.insert(&p, id, id, id);
        }
        let buckets = shard.status(0).buckets;

        let victims = shard.clear();
        assert_eq!(victims.len(), 10);
        assert_eq!(shard.len(), 0);
        assert_eq!(shard.bytes_used(), 0);
        assert_eq!(shard.status(0).buckets, buckets);
        assert!(lru_keys(&shard).is_empty());
        shard.check(&p).unwrap();

        shard.insert(&p, weak_hash(3), 3, 3);
        assert_eq!(value_of(&mut shard, 3), Some(3));
    }

    #[test]
    fn test_shard_slots_are_reused() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        shard.insert(&p, 1, 1, 1);
        shard.insert(&p, 2, 2, 2);
        shard.remove(&p, 1, &1);
        shard.insert(&p, 3, 3, 3);

        assert_eq!(shard.nodes.len(), 2);
        shard.check(&p).unwrap();
    }

    #[test]
    fn test_shard_status() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);

        shard.insert(&p, weak_hash(1), 1, 1);
        shard.insert(&p, weak_hash(17), 17, 17);
        shard.insert(&p, weak_hash(2), 2, 2);

        let status = shard.status(5);
        assert_eq!(status.index, 5);
        assert_eq!(status.entries, 3);
        assert_eq!(status.buckets, 4);
        assert_eq!(status.bytes_used, 3 * ENTRY);
        assert_eq!(status.bytes_max, 1000);
        assert_eq!(status.longest_chain, 2);
        assert!(shard.memory_usage() >= 3 * ENTRY);
    }

    #[test]
    fn test_shard_check_detects_corruption() {
        let p = policy();
        let mut shard = Shard::new(4, 1000);
        shard.insert(&p, 1, 1, 1);
        shard.insert(&p, 2, 2, 2);

        shard.bytes_used += 1;
        assert!(shard.check(&p).is_err());
        shard.bytes_used -= 1;

        shard.tail = None;
        assert!(shard.check(&p).is_err());
    }
}
