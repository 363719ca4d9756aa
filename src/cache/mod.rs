// Tiered cache with per-entry TTL over swappable storage backends
pub mod database;
pub mod key_value;
pub mod memory;

pub use database::DatabaseStore;
pub use key_value::KeyValueStore;
pub use memory::MemoryStore;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task;

use crate::error::{PriceError, Result};

/// A stored value together with the time it was written and its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    pub stored_at: i64,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: now_millis(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        let age = now_ms.saturating_sub(self.stored_at);
        age >= 0 && age as u64 >= self.ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Storage backend of a [`Cache`].
///
/// Implementations enforce their own capacity on `put`.
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether operations touch the filesystem or a database and must run
    /// on the blocking thread pool.
    fn is_blocking(&self) -> bool {
        false
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            max_size: 1_000,
        }
    }
}

/// Durable storage available to the process.
///
/// Passed in explicitly so that backend selection does not depend on
/// probing the host environment.
#[derive(Clone, Debug, Default)]
pub struct StorageCapabilities {
    /// Path of a SQLite database file.
    pub database: Option<PathBuf>,
    /// Path of a JSON document used as a key-value store.
    pub key_value: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    KeyValue(PathBuf),
    Database(PathBuf),
}

impl CacheBackend {
    /// Prefers the database, then the key-value store, then memory.
    pub fn select(capabilities: &StorageCapabilities) -> Self {
        if let Some(path) = &capabilities.database {
            CacheBackend::Database(path.clone())
        } else if let Some(path) = &capabilities.key_value {
            CacheBackend::KeyValue(path.clone())
        } else {
            CacheBackend::Memory
        }
    }
}

/// Cache facade used by the aggregator.
///
/// Operations on durable backends run through `spawn_blocking`. Backend
/// failures are logged and the operation is served by an in-memory
/// fallback store; they never reach the caller.
pub struct Cache {
    primary: Arc<dyn CacheStore>,
    fallback: MemoryStore,
    config: CacheConfig,
}

impl Cache {
    /// Opens the requested backend, degrading to memory if it cannot be opened.
    pub fn new(backend: CacheBackend, config: CacheConfig) -> Self {
        let primary: Arc<dyn CacheStore> = match backend {
            CacheBackend::Memory => Arc::new(MemoryStore::new(config.max_size)),
            CacheBackend::KeyValue(path) => Arc::new(KeyValueStore::new(path, config.max_size)),
            CacheBackend::Database(path) => match DatabaseStore::open(&path, config.max_size) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        "Cache database {} unavailable, using memory: {}",
                        path.display(),
                        e
                    );
                    Arc::new(MemoryStore::new(config.max_size))
                }
            },
        };
        debug!("Cache backend: {}", primary.name());

        Self {
            primary,
            fallback: MemoryStore::new(config.max_size),
            config,
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(CacheBackend::Memory, config)
    }

    pub fn from_capabilities(capabilities: &StorageCapabilities, config: CacheConfig) -> Self {
        Self::new(CacheBackend::select(capabilities), config)
    }

    pub fn backend_name(&self) -> &'static str {
        self.primary.name()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    async fn on_primary<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CacheStore) -> Result<T> + Send + 'static,
    {
        if !self.primary.is_blocking() {
            return op(self.primary.as_ref());
        }

        let store = Arc::clone(&self.primary);
        task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| PriceError::StorageError(format!("cache task failed: {}", e)))?
    }

    /// Returns the value under `key` unless it is missing, expired or of a
    /// different shape than `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let owned = key.to_string();
        let value = match self.on_primary(move |store| read_live(store, &owned)).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => self.read_fallback(key),
            Err(e) => {
                warn!("Cache read from {} failed for '{}': {}", self.primary.name(), key, e);
                self.read_fallback(key)
            }
        }?;

        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable cache entry '{}': {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    fn read_fallback(&self, key: &str) -> Option<Value> {
        read_live(&self.fallback, key).ok().flatten()
    }

    /// Stores `value` under `key` for `ttl`, or the default TTL when `None`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot serialize cache value for '{}': {}", key, e);
                return;
            }
        };
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.config.default_ttl));

        let owned = key.to_string();
        let stored = entry.clone();
        match self.on_primary(move |store| store.put(&owned, stored)).await {
            // An older copy kept while the primary was failing is superseded.
            Ok(()) => {
                let _ = self.fallback.remove(key);
            }
            Err(e) => {
                warn!(
                    "Cache write to {} failed for '{}', keeping it in memory: {}",
                    self.primary.name(),
                    key,
                    e
                );
                let _ = self.fallback.put(key, entry);
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        let owned = key.to_string();
        if let Err(e) = self.on_primary(move |store| store.remove(&owned)).await {
            warn!("Cache delete on {} failed for '{}': {}", self.primary.name(), key, e);
        }
        let _ = self.fallback.remove(key);
    }

    pub async fn clear(&self) {
        if let Err(e) = self.on_primary(|store| store.clear()).await {
            warn!("Cache clear on {} failed: {}", self.primary.name(), e);
        }
        let _ = self.fallback.clear();
    }

    /// Number of entries held by the primary backend, expired ones included.
    pub async fn len(&self) -> usize {
        self.on_primary(|store| store.len()).await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::in_memory(CacheConfig::default())
    }
}

/// Reads `key` from `store`, removing the entry when it has expired.
fn read_live(store: &dyn CacheStore, key: &str) -> Result<Option<Value>> {
    match store.get(key)? {
        Some(entry) if entry.is_expired() => {
            debug!("Cache entry '{}' expired in {}", key, store.name());
            store.remove(key)?;
            Ok(None)
        }
        Some(entry) => Ok(Some(entry.value)),
        None => Ok(None),
    }
}
