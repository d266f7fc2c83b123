//! Key-value store abstraction.
//!
//! Job plans and progress entries live in a store that is injected into the
//! components using them, so two instances (or two test runs) never share
//! hidden global state. Every method on [`KeyValueStore`] is a single-key
//! operation that either happens completely or not at all.

use crate::types::{thread_safe_rw_map, ThreadSafeRwMap};

/// A concurrent map from job identifier to a value.
pub trait KeyValueStore<V>: Send + Sync {
    /// Get a copy of the value stored under `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Store `value` under `key`, returning the previous value.
    fn insert(&self, key: String, value: V) -> Option<V>;

    /// Remove the value stored under `key`.
    fn remove(&self, key: &str) -> Option<V>;

    /// Mutate the value stored under `key` in place and return the result.
    ///
    /// Returns `None` without calling `apply` when the key is absent.
    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> Option<V>;

    /// Mutate the value under `key`, creating it with `init` first when absent.
    fn upsert(&self, key: &str, init: &mut dyn FnMut() -> V, apply: &mut dyn FnMut(&mut V))
        -> V;

    /// All keys currently stored.
    fn keys(&self) -> Vec<String>;

    /// Number of stored entries.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store backed by a `parking_lot` reader-writer map.
///
/// Cloning yields another handle onto the same map.
#[derive(Debug)]
pub struct InMemoryStore<V> {
    entries: ThreadSafeRwMap<String, V>,
}

impl<V> InMemoryStore<V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: thread_safe_rw_map(),
        }
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for InMemoryStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<V> KeyValueStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn insert(&self, key: String, value: V) -> Option<V> {
        self.entries.write().insert(key, value)
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries.write().remove(key)
    }

    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> Option<V> {
        let mut entries = self.entries.write();
        let value = entries.get_mut(key)?;
        apply(value);
        Some(value.clone())
    }

    fn upsert(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> V,
        apply: &mut dyn FnMut(&mut V),
    ) -> V {
        let mut entries = self.entries.write();
        let value = entries.entry(key.to_string()).or_insert_with(|| init());
        apply(value);
        value.clone()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_insert_get_remove() {
        let store: InMemoryStore<u32> = InMemoryStore::new();
        assert!(store.is_empty());

        assert_eq!(store.insert("a".to_string(), 1), None);
        assert_eq!(store.insert("a".to_string(), 2), Some(1));
        assert_eq!(store.get("a"), Some(2));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove("a"), Some(2));
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_update_missing_key_is_noop() {
        let store: InMemoryStore<u32> = InMemoryStore::new();
        let mut called = false;
        let result = store.update("missing", &mut |_| called = true);
        assert_eq!(result, None);
        assert!(!called);
    }

    #[test]
    fn test_upsert_creates_then_mutates() {
        let store: InMemoryStore<u32> = InMemoryStore::new();
        let first = store.upsert("job", &mut || 10, &mut |v| *v += 1);
        assert_eq!(first, 11);
        let second = store.upsert("job", &mut || 100, &mut |v| *v += 1);
        assert_eq!(second, 12);
    }

    #[test]
    fn test_clones_share_entries() {
        let store: InMemoryStore<&'static str> = InMemoryStore::new();
        let other = store.clone();
        other.insert("k".to_string(), "v");
        assert_eq!(store.get("k"), Some("v"));
    }

    #[test]
    fn test_concurrent_updates_do_not_interfere() {
        let store = Arc::new(InMemoryStore::<u64>::new());
        store.insert("a".to_string(), 0);
        store.insert("b".to_string(), 0);

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|key| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update(key, &mut |v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("a"), Some(1000));
        assert_eq!(store.get("b"), Some(1000));
    }
}
