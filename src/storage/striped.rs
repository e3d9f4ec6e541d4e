//! Striped store (C3): a fixed array of independent shards, keys routed by
//! `hash(key) mod N`. Grounded on the `hash(key) % n_shards` routing in the
//! lineage's striped-lock map, generalized from a fixed power-of-two shard
//! count to an arbitrary `N` validated against a per-shard byte budget.

use xxhash_rust::xxh3::xxh3_64;

use crate::error::StorageError;

use super::sync_shard::SyncShard;

const MIN_SHARD_BYTES: usize = 8;
const MAX_SHARD_BYTES: usize = 1 << 20;

/// Sharded, thread-safe key/value store with per-shard LRU eviction.
///
/// Each operation touches exactly one shard, selected by `xxh3_64(key) % N`;
/// no operation ever holds more than one shard's lock.
#[derive(Debug)]
pub struct StripedStore {
    shards: Vec<SyncShard>,
}

impl StripedStore {
    /// `total_max_bytes` is divided evenly across `shard_count` shards. Fails
    /// if `shard_count == 0` or the resulting per-shard budget falls outside
    /// `[8, 1_048_576]` bytes.
    pub fn new(total_max_bytes: usize, shard_count: usize) -> Result<Self, StorageError> {
        if shard_count == 0 {
            return Err(StorageError::ZeroShards);
        }
        let per_shard = total_max_bytes / shard_count;
        if !(MIN_SHARD_BYTES..=MAX_SHARD_BYTES).contains(&per_shard) {
            return Err(StorageError::PerShardBudgetOutOfRange {
                per_shard,
                min: MIN_SHARD_BYTES,
                max: MAX_SHARD_BYTES,
            });
        }
        let shards = (0..shard_count).map(|_| SyncShard::new(per_shard)).collect();
        Ok(Self { shards })
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, key: &[u8]) -> &SyncShard {
        let idx = (xxh3_64(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Index of the shard `key` routes to; exposed for the S5 property test
    /// (exactly one shard touched per key) and for per-shard telemetry.
    pub fn shard_index(&self, key: &[u8]) -> usize {
        (xxh3_64(key) % self.shards.len() as u64) as usize
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> bool {
        self.shard_for(key).put(key, value)
    }

    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool {
        self.shard_for(key).put_if_absent(key, value)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> bool {
        self.shard_for(key).set(key, value)
    }

    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> bool {
        self.shard_for(key).get(key, out)
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        self.shard_for(key).delete(key)
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
#[path = "striped_test.rs"]
mod striped_test;
