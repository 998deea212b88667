use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Trie;

/// A value handed out by [`TrieStore::get`]. The guard owns the root it
/// was read from, so the value stays alive however the store advances.
pub struct ValueGuard<T> {
    /// The root snapshot the value was found in
    snapshot: Trie,
    value: Arc<T>,
}

impl<T> ValueGuard<T> {
    fn new(snapshot: Trie, value: Arc<T>) -> Self {
        Self { snapshot, value }
    }

    /// Returns the value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the root snapshot this value was read from.
    pub fn snapshot(&self) -> &Trie {
        &self.snapshot
    }
}

impl<T> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// TrieStore is a concurrent façade over [`Trie`]: readers traverse a
/// snapshot without holding any lock, while writers are serialized and
/// publish whole new roots atomically.
///
/// Locking protocol: the root mutex only guards reading or swapping the
/// root handle and is never held across trie work; the write mutex is
/// taken first by every modifier and serializes them for the duration of
/// the rebuild.
#[derive(Default)]
pub struct TrieStore {
    /// The current root. Lock, copy the handle, unlock, then traverse.
    root: Mutex<Trie>,
    /// Writer serialization. Acquired before the root mutex.
    write_lock: Mutex<()>,
}

impl TrieStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key` in the current snapshot. The returned guard keeps
    /// that snapshot alive; concurrent writers cannot invalidate it.
    pub fn get<T: Any + Send + Sync>(&self, key: &[u8]) -> Option<ValueGuard<T>> {
        let snapshot = self.root.lock().clone();
        let value = snapshot.get_arc::<T>(key)?;
        Some(ValueGuard::new(snapshot, value))
    }

    /// Stores `value` under `key`. Writers are serialized; readers are
    /// never blocked while the new root is built.
    pub fn put<T: Any + Send + Sync>(&self, key: &[u8], value: T) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let next = snapshot.put(key, value);
        *self.root.lock() = next;
    }

    /// Removes the value under `key`, if any.
    pub fn remove(&self, key: &[u8]) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let next = snapshot.remove(key);
        *self.root.lock() = next;
    }
}
