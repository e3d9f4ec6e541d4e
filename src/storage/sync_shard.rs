//! Thread-safe wrapper around [`super::shard::Shard`] (C2): a single
//! exclusive lock guards every operation, held only for the duration of the
//! call - no blocking or suspension happens while it is held.

use parking_lot::Mutex;

use super::shard::Shard;

#[derive(Debug)]
pub struct SyncShard {
    inner: Mutex<Shard>,
}

impl SyncShard {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Shard::new(max_bytes)),
        }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put(key, value)
    }

    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put_if_absent(key, value)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().set(key, value)
    }

    pub fn get(&self, key: &[u8], out: &mut Vec<u8>) -> bool {
        self.inner.lock().get(key, out)
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        self.inner.lock().delete(key)
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn cur_bytes(&self) -> usize {
        self.inner.lock().cur_bytes()
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.lock().max_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_puts_from_multiple_threads_all_land() {
        let shard = Arc::new(SyncShard::new(1 << 16));
        let mut handles = Vec::new();
        for t in 0..8 {
            let shard = shard.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{t}-k{i}");
                    shard.put(key.as_bytes(), b"v");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shard.len(), 800);
    }

    #[test]
    fn get_after_put_observes_the_written_value() {
        let shard = SyncShard::new(1024);
        assert!(shard.put(b"k", b"v"));
        let mut out = Vec::new();
        assert!(shard.get(b"k", &mut out));
        assert_eq!(out, b"v");
    }
}
