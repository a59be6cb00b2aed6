// Unique Set - keys currently queued or in flight

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Key presence set shared by a unique queue and its worker pool.
///
/// Check-and-insert runs under one lock acquisition; that is the whole
/// at-most-one-outstanding guarantee.
#[derive(Debug, Default)]
pub struct UniqueSet {
    keys: Mutex<HashSet<String>>,
}

impl UniqueSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding this lock cannot leave the set half-updated
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert `key` unless present. Returns false for a duplicate.
    pub fn insert_if_absent(&self, key: &str) -> bool {
        let mut keys = self.keys();
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.keys().remove(key)
    }

    pub fn extend<I: IntoIterator<Item = String>>(&self, keys: I) {
        self.keys().extend(keys);
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_if_absent() {
        let set = UniqueSet::new();
        assert!(set.insert_if_absent("pr:2"));
        assert!(!set.insert_if_absent("pr:2"));
        assert!(set.contains("pr:2"));
        assert!(set.remove("pr:2"));
        assert!(!set.contains("pr:2"));
        assert!(set.insert_if_absent("pr:2"));
    }

    #[test]
    fn test_concurrent_inserts_admit_exactly_one() {
        let set = Arc::new(UniqueSet::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || set.insert_if_absent("same"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(set.len(), 1);
    }
}
