//! Bounded LRU shard (C1): an ordered key/value map with a byte budget and
//! strict LRU eviction. Grounded on the shard/eviction split in
//! `storage/map/shard.rs` and `storage/map/eviction.rs` of the lineage this
//! crate descends from, restricted to a hard per-put byte budget instead of
//! background soft/hard watermarks.

use super::lru::LruList;

fn entry_size(key: &[u8], value: &[u8]) -> usize {
    key.len() + value.len()
}

/// A single LRU partition covering a disjoint key subset.
///
/// Not thread-safe on its own; see [`super::sync_shard::SyncShard`] for the
/// mutex-guarded wrapper (C2).
#[derive(Debug)]
pub struct Shard {
    list: LruList,
    max_bytes: usize,
    cur_bytes: usize,
}

impl Shard {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            list: LruList::new(),
            max_bytes,
            cur_bytes: 0,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn cur_bytes(&self) -> usize {
        self.cur_bytes
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Evicts entries from the LRU end until `needed` additional bytes fit
    /// within the budget. Eviction is silent; no callback fires.
    fn make_room(&mut self, needed: usize) {
        while self.cur_bytes + needed > self.max_bytes {
            match self.list.evict_lru() {
                Some((klen, vlen)) => self.cur_bytes -= klen + vlen,
                None => break,
            }
        }
    }

    /// Inserts or replaces `key`. Fails (no side effect) if the entry alone
    /// would exceed the budget.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        let size = entry_size(key, value);
        if size > self.max_bytes {
            return false;
        }
        if let Some(old_len) = self.list.touch_set(key, value.to_vec()) {
            // `touch_set` already moved the entry to MRU, so it can only be
            // evicted below if it is the shard's sole entry - and the size
            // precheck above rules that out. Account for the value delta,
            // then evict other (colder) entries if the new total overflows.
            self.cur_bytes = self.cur_bytes - (key.len() + old_len) + size;
            self.make_room(0);
            return true;
        }
        self.make_room(size);
        self.list.insert_new(key, value.to_vec());
        self.cur_bytes += size;
        true
    }

    /// Inserts `key` only if absent; never touches an existing entry.
    pub fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.list.contains(key) {
            return false;
        }
        let size = entry_size(key, value);
        if size > self.max_bytes {
            return false;
        }
        self.make_room(size);
        self.list.insert_new(key, value.to_vec());
        self.cur_bytes += size;
        true
    }

    /// Updates an existing entry only; fails if absent or oversized.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        if !self.list.contains(key) {
            return false;
        }
        let size = entry_size(key, value);
        if size > self.max_bytes {
            return false;
        }
        self.put(key, value)
    }

    /// Copies the value for `key` into `out` and moves the entry to MRU.
    pub fn get(&mut self, key: &[u8], out: &mut Vec<u8>) -> bool {
        match self.list.touch_get(key) {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    /// Removes `key`, reclaiming its bytes. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.list.remove(key) {
            Some(value) => {
                self.cur_bytes -= key.len() + value.len();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.cur_bytes = 0;
    }
}

#[cfg(test)]
#[path = "shard_test.rs"]
mod shard_test;
