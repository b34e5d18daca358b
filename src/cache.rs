//! Caller-owned fetch cache.
//!
//! Three independent partitions (catalog indexes, single items, raw content),
//! each keyed by request URL. Clones share the same storage, so one store can
//! serve several concurrent resolutions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::catalog::{CatalogIndex, DistributableItem};

/// A cached payload with the validator needed to revalidate it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub etag: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, etag: Option<String>) -> Self {
        Self {
            data,
            etag,
            timestamp: SystemTime::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.timestamp.elapsed().unwrap_or_default()
    }
}

type Partition<T> = Arc<Mutex<HashMap<String, CacheEntry<T>>>>;

/// Thread-safe three-partition cache.
#[derive(Clone, Default)]
pub struct CacheStore {
    indexes: Partition<Arc<CatalogIndex>>,
    items: Partition<Arc<DistributableItem>>,
    raw: Partition<Arc<str>>,
    max_stale: Option<Duration>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `max_stale` are no longer served when revalidation
    /// fails. They are still used for conditional requests.
    pub fn with_max_stale(max_stale: Duration) -> Self {
        Self {
            max_stale: Some(max_stale),
            ..Self::default()
        }
    }

    pub fn max_stale(&self) -> Option<Duration> {
        self.max_stale
    }

    /// Whether `entry` may be served after a failed revalidation.
    pub fn is_servable_stale<T>(&self, entry: &CacheEntry<T>) -> bool {
        self.max_stale.is_none_or(|limit| entry.age() <= limit)
    }

    pub fn index(&self, url: &str) -> Option<CacheEntry<Arc<CatalogIndex>>> {
        lock(&self.indexes).get(url).cloned()
    }

    pub fn put_index(&self, url: &str, entry: CacheEntry<Arc<CatalogIndex>>) {
        lock(&self.indexes).insert(url.to_string(), entry);
    }

    pub fn item(&self, url: &str) -> Option<CacheEntry<Arc<DistributableItem>>> {
        lock(&self.items).get(url).cloned()
    }

    pub fn put_item(&self, url: &str, entry: CacheEntry<Arc<DistributableItem>>) {
        lock(&self.items).insert(url.to_string(), entry);
    }

    pub fn raw(&self, url: &str) -> Option<CacheEntry<Arc<str>>> {
        lock(&self.raw).get(url).cloned()
    }

    pub fn put_raw(&self, url: &str, entry: CacheEntry<Arc<str>>) {
        lock(&self.raw).insert(url.to_string(), entry);
    }

    /// Removes every entry from all partitions.
    pub fn clear(&self) {
        lock(&self.indexes).clear();
        lock(&self.items).clear();
        lock(&self.raw).clear();
    }

    /// Number of entries per partition: (indexes, items, raw).
    pub fn len(&self) -> (usize, usize, usize) {
        (
            lock(&self.indexes).len(),
            lock(&self.items).len(),
            lock(&self.raw).len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0, 0)
    }
}

/// A poisoned lock only means another thread panicked mid-insert; the map
/// itself is still consistent.
fn lock<T>(partition: &Mutex<T>) -> MutexGuard<'_, T> {
    partition.lock().unwrap_or_else(|e| e.into_inner())
}
