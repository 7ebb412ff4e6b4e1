//! # Key-value store
//!
//! Wraps the ordered byte-key store contract this hub relies on: `set` on a batch built
//! lock-free between commits, `writeSync` to durably flush it, point `get`, and a bounded
//! reverse-range scan used by every historical query. [`RocksStore`] is the one production
//! implementation, backed by `rocksdb`; tests may swap in [`MemoryStore`] instead since both
//! implement the same [`KeyValueStore`] trait.

use crate::error::StoreError;
use std::sync::Arc;

/// A batch of pending writes, built without holding any lock. The router appends to its own
/// batch between commits; [`KeyValueStore::write_sync`] takes ownership of a finished batch and
/// swaps it for a fresh one under the store's write lock.
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((key, value));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// The ordered byte-key, byte-value store contract every historical query and the commit flush
/// are built against.
pub trait KeyValueStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Reverse scan over `[start, end)`, newest (highest) key first, capped at `limit` pairs.
    fn reverse_scan(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Durably flushes `batch` (fsync-equivalent). A failure here is fatal at the call site: the
    /// process is expected to exit so the upstream transport replays from the last persisted
    /// offset.
    fn write_sync(&self, batch: Batch) -> Result<(), StoreError>;
}

/// Production store backed by `rocksdb`.
pub struct RocksStore {
    db: Arc<rocksdb::DB>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore").finish_non_exhaustive()
    }
}

impl RocksStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path).map_err(|err| StoreError::Engine(err.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }

    fn reverse_scan(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mode = rocksdb::IteratorMode::From(end, rocksdb::Direction::Reverse);
        let mut out = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item.map_err(|err| StoreError::Engine(err.to_string()))?;
            if key.as_ref() >= end || key.as_ref() < start {
                if key.as_ref() < start {
                    break;
                }
                continue;
            }
            out.push((key.to_vec(), value.to_vec()));
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn write_sync(&self, batch: Batch) -> Result<(), StoreError> {
        let mut write_batch = rocksdb::WriteBatch::default();
        for (key, value) in batch.ops {
            write_batch.put(key, value);
        }
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(true);
        self.db
            .write_opt(write_batch, &write_opts)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }
}

/// An in-memory store used by tests that don't need a real rocksdb handle.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: parking_lot::RwLock<std::collections::BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full key/value dump in key order, for tests comparing two stores for equality after
    /// independent replays (e.g. a crash-before-flush run vs. a never-failed run).
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.inner.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn reverse_scan(
        &self,
        start: &[u8],
        end: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let guard = self.inner.read();
        let out = guard
            .range(start.to_vec()..end.to_vec())
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(out)
    }

    fn write_sync(&self, batch: Batch) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        for (key, value) in batch.ops {
            guard.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_data::codec;
    use hub_data::kind::Kind;

    #[test]
    fn memory_store_reverse_scan_is_newest_first() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        for (time, serial) in [(100u64, 1u64), (100, 2), (101, 0)] {
            let key = codec::encode(Kind::Deal, b"BTC/USD", 0, time, serial).unwrap();
            batch.set(key, format!("{time}-{serial}").into_bytes());
        }
        store.write_sync(batch).unwrap();

        let start = codec::start_key(Kind::Deal, b"BTC/USD").unwrap();
        let end = codec::end_key(Kind::Deal, b"BTC/USD", u64::MAX, u64::MAX).unwrap();
        let results = store.reverse_scan(&start, &end, 10).unwrap();
        let values: Vec<String> = results
            .into_iter()
            .map(|(_, v)| String::from_utf8(v).unwrap())
            .collect();
        assert_eq!(values, vec!["101-0", "100-2", "100-1"]);
    }

    #[test]
    fn memory_store_reverse_scan_respects_limit() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        for serial in 0..5u64 {
            let key = codec::encode(Kind::Deal, b"BTC/USD", 0, 100, serial).unwrap();
            batch.set(key, vec![serial as u8]);
        }
        store.write_sync(batch).unwrap();

        let start = codec::start_key(Kind::Deal, b"BTC/USD").unwrap();
        let end = codec::end_key(Kind::Deal, b"BTC/USD", u64::MAX, u64::MAX).unwrap();
        let results = store.reverse_scan(&start, &end, 2).unwrap();
        assert_eq!(results.len(), 2);
    }
}
