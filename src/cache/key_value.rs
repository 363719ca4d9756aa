// Persistent key-value store kept as a single JSON document
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{PriceError, Result};

type Document = BTreeMap<String, String>;

/// Maps each key to the serialized text of its [`CacheEntry`]. Writes go
/// through a temporary file so an interrupted write keeps the previous
/// document.
pub struct KeyValueStore {
    path: PathBuf,
    max_size: usize,
    // Serializes read-modify-write cycles on the document.
    lock: Mutex<()>,
}

impl KeyValueStore {
    pub fn new(path: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            path: path.into(),
            max_size: max_size.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Document::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                PriceError::StorageError(format!(
                    "corrupt cache document {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, document: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string(document)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn with_document<T>(&self, f: impl FnOnce(&mut Document) -> Result<(T, bool)>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut document = self.load()?;
        let (result, dirty) = f(&mut document)?;
        if dirty {
            self.save(&document)?;
        }
        Ok(result)
    }

    /// Drops the oldest tenth of the document (at least one entry) by
    /// `stored_at`. Entries that no longer parse are dropped first.
    fn evict_oldest(&self, document: &mut Document) {
        let mut ages: Vec<(i64, String)> = document
            .iter()
            .map(|(key, text)| {
                let stored_at = serde_json::from_str::<CacheEntry>(text)
                    .map(|entry| entry.stored_at)
                    .unwrap_or(i64::MIN);
                (stored_at, key.clone())
            })
            .collect();
        ages.sort();

        let count = (document.len() / 10).max(1);
        for (_, key) in ages.into_iter().take(count) {
            document.remove(&key);
        }
        debug!("Evicted {} entries from {}", count, self.path.display());
    }
}

impl CacheStore for KeyValueStore {
    fn name(&self) -> &'static str {
        "key-value"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.with_document(|document| {
            let entry = match document.get(key) {
                Some(text) => Some(serde_json::from_str(text)?),
                None => None,
            };
            Ok((entry, false))
        })
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let text = serde_json::to_string(&entry)?;
        self.with_document(|document| {
            document.remove(key);
            if document.len() >= self.max_size {
                self.evict_oldest(document);
            }
            document.insert(key.to_string(), text);
            Ok(((), true))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_document(|document| {
            let dirty = document.remove(key).is_some();
            Ok(((), dirty))
        })
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.save(&Document::new())
    }

    fn len(&self) -> Result<usize> {
        self.with_document(|document| Ok((document.len(), false)))
    }
}
