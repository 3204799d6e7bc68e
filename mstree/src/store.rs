//! The key-value storage contract and the in-memory reference store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// A put-if-absent byte store.
///
/// The tree addresses every persisted node by its key prefix followed by the
/// node digest, so keys
/// are opaque byte strings to the adapter and stored entries are immutable:
/// once written, a key's value never changes. Adapters are expected to be
/// crash-consistent at the granularity of a single `put_if_absent`.
pub trait KvStore {
    /// Fetch the value stored under `key`, or `None` when absent.
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store `(key, value)` atomically if `key` was absent. Returns `true`
    /// when the pair was written, `false` when the key already existed.
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> anyhow::Result<bool>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> anyhow::Result<bool> {
        (**self).put_if_absent(key, value)
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> anyhow::Result<bool> {
        (**self).put_if_absent(key, value)
    }
}

/// An in-memory [`KvStore`].
///
/// This is a lightweight handle: clones share the same underlying map, so a
/// store can back several trees at once. Intended for tests, development and
/// as a reference implementation of the storage contract; production
/// deployments plug in a database-backed adapter instead.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries currently stored.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of `get` calls served since creation.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// The number of entries written since creation. Puts of already-present
    /// keys are not counted.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.entries.read().get(key).cloned())
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> anyhow::Result<bool> {
        let mut entries = self.inner.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_vec(), value.to_vec());
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}
