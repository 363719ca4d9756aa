use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::cache::{CacheEntry, CacheStore};
use crate::error::Result;

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, CacheEntry>,
    // Keys in insertion order, oldest first.
    order: VecDeque<String>,
}

impl MemoryInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

/// In-process store. When full, the oldest inserted entry is evicted,
/// regardless of how recently it was read.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    max_size: usize,
}

impl MemoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            max_size: max_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keys from oldest to newest insertion.
    pub fn keys(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }
}

impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut inner = self.lock();
        // A rewrite counts as a fresh insertion.
        inner.remove(key);

        if inner.entries.len() >= self.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(key.to_string(), entry);
        inner.order.push_back(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock().entries.len())
    }
}
