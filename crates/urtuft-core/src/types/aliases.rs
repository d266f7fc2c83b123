//! Type aliases for the shared-state types used across crates.
//!
//! Job plans and progress entries are read by request handlers and written by
//! the telemetry listener at the same time, so shared maps are wrapped in a
//! `parking_lot` reader-writer lock behind an `Arc`.
//!
//! ```rust,ignore
//! use urtuft_core::types::*;
//!
//! let jobs: ThreadSafeRwMap<String, u64> = thread_safe_rw_map();
//! jobs.write().insert("job".to_string(), 3);
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe reader-writer hash map.
///
/// Uses `parking_lot::RwLock`, which never poisons, so a panicking writer
/// cannot wedge every later reader.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Create a new empty `ThreadSafeRwMap<K, V>`.
#[inline]
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_rw_map() {
        let map: ThreadSafeRwMap<String, i32> = thread_safe_rw_map();
        map.write().insert("key1".to_string(), 1);

        // Multiple readers
        let first = map.read();
        let second = map.read();
        assert_eq!(first.get("key1"), Some(&1));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_clones_share_the_map() {
        let map: ThreadSafeRwMap<String, i32> = thread_safe_rw_map();
        let other = Arc::clone(&map);
        other.write().insert("key".to_string(), 7);
        assert_eq!(map.read().get("key"), Some(&7));
    }
}
