//! Two-layer cache with TTL expiry and observation-order eviction.
//!
//! The memory layer is always present. An optional [`DurableStore`] backs it
//! so entries survive restarts; every durable failure is logged and treated
//! as a miss. Values restored from the durable layer are re-stamped with the
//! current time when they are promoted into memory.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, warn};
use modsync_backend::DurableStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

const KEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub namespace: String,
    pub ttl: Duration,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn new(namespace: impl Into<String>, ttl: Duration, capacity: usize) -> Self {
        Self {
            namespace: namespace.into(),
            ttl,
            capacity,
        }
    }

    /// Remote manifest and config bundles, meant to be backed by disk.
    #[must_use]
    pub fn bundles() -> Self {
        Self::new("github", Duration::from_secs(10 * 60), 50)
    }

    /// Raw config file text, memory only.
    #[must_use]
    pub fn config_text() -> Self {
        Self::new("config", Duration::from_secs(15 * 60), 30)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
    ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    // A zero TTL never produces a live entry, even at the instant of insertion.
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_ms == 0 {
            return false;
        }
        let ttl = i64::try_from(self.ttl_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.stored_at) <= ttl
    }
}

pub struct TieredCache<K: Eq + Hash + Clone, V> {
    config: CacheConfig,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone + Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn memory(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            durable: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn durable(config: CacheConfig, store: Arc<dyn DurableStore>) -> Self {
        let mut cache = Self::memory(config);
        cache.durable = Some(store);
        cache
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Current time as seen by this cache's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();

        {
            let mut entries = self.lock_entries();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    debug!("Cache hit (memory): {}", self.namespaced(key));
                    return Some(entry.value.clone());
                }
                Some(_) => {
                    entries.remove(key);
                    debug!("Cache entry expired (memory): {}", self.namespaced(key));
                }
                None => {}
            }
        }

        let Some(stored) = self.load_durable(key, now) else {
            debug!("Cache miss: {}", self.namespaced(key));
            return None;
        };

        if self.config.capacity > 0 {
            let mut entries = self.lock_entries();
            let restored = CacheEntry {
                value: stored.value.clone(),
                stored_at: now,
                ttl_ms: stored.ttl_ms,
            };
            self.insert_locked(&mut entries, key.clone(), restored, now);
        }
        debug!("Cache hit (durable): {}", self.namespaced(key));
        Some(stored.value)
    }

    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        if self.config.capacity == 0 {
            debug!(
                "Cache disabled (capacity 0), not storing {}",
                self.namespaced(&key)
            );
            return;
        }
        if ttl.is_zero() {
            debug!("Zero TTL, not storing {}", self.namespaced(&key));
            return;
        }

        let now = self.clock.now();
        let entry = CacheEntry::new(value, now, ttl);
        let serialized = self
            .durable
            .as_ref()
            .map(|_| serde_json::to_string(&entry));

        let size = {
            let mut entries = self.lock_entries();
            self.insert_locked(&mut entries, key.clone(), entry, now);
            entries.len()
        };

        match serialized {
            Some(Ok(serialized)) => self.persist_durable(&key, &serialized),
            Some(Err(error)) => warn!(
                "Failed to serialize cache entry {}: {error}",
                self.namespaced(&key)
            ),
            None => {}
        }

        debug!(
            "Cache set: {} (ttl {}ms, size {size})",
            self.namespaced(&key),
            ttl.as_millis()
        );
    }

    pub fn remove(&self, key: &K) {
        self.lock_entries().remove(key);

        if let Some(store) = &self.durable
            && let Err(error) = store.delete_entry(&self.namespaced(key))
        {
            warn!(
                "Failed to remove durable cache entry {}: {error}",
                self.namespaced(key)
            );
        }

        debug!("Cache removed: {}", self.namespaced(key));
    }

    /// Drop every entry of this cache's namespace from both layers.
    pub fn clear(&self) {
        self.lock_entries().clear();

        if let Some(store) = &self.durable
            && let Err(error) = store.delete_by_prefix(&self.namespace_prefix())
        {
            warn!(
                "Failed to clear durable cache namespace {}: {error}",
                self.config.namespace
            );
        }

        debug!("Cache cleared: {}", self.config.namespace);
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.lock_entries();
        let total = entries.len();
        let expired = entries.values().filter(|entry| !entry.is_live(now)).count();

        CacheStats {
            total,
            active: total - expired,
            expired,
            capacity: self.config.capacity,
        }
    }

    /// Number of entries of this namespace held by the durable layer, live or
    /// not. `None` for memory-only caches or when the store cannot be read.
    pub fn durable_len(&self) -> Option<usize> {
        let store = self.durable.as_ref()?;
        match store.count_by_prefix(&self.namespace_prefix()) {
            Ok(count) => Some(count),
            Err(error) => {
                warn!(
                    "Failed to count durable cache namespace {}: {error}",
                    self.config.namespace
                );
                None
            }
        }
    }

    /// Purge expired entries and evict the oldest observations above capacity.
    pub fn cleanup(&self) {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        prune(&mut entries, now, self.config.capacity);
    }

    // The key being written is taken out before eviction so that, once it is
    // reinserted, the memory layer holds at most `capacity` entries.
    fn insert_locked(
        &self,
        entries: &mut HashMap<K, CacheEntry<V>>,
        key: K,
        entry: CacheEntry<V>,
        now: DateTime<Utc>,
    ) {
        entries.remove(&key);
        prune(entries, now, self.config.capacity.saturating_sub(1));
        entries.insert(key, entry);
    }

    fn load_durable(&self, key: &K, now: DateTime<Utc>) -> Option<CacheEntry<V>> {
        let store = self.durable.as_ref()?;
        let durable_key = self.namespaced(key);

        let raw = match store.load_entry(&durable_key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(error) => {
                warn!("Failed to read from durable cache {durable_key}: {error}");
                return None;
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!("Discarding unreadable durable cache entry {durable_key}: {error}");
                let _ = store.delete_entry(&durable_key);
                return None;
            }
        };

        if !entry.is_live(now) {
            debug!(
                "Cache entry expired (durable): {durable_key}, ttl {}ms",
                entry.ttl().as_millis()
            );
            if let Err(error) = store.delete_entry(&durable_key) {
                warn!("Failed to purge expired durable cache entry {durable_key}: {error}");
            }
            return None;
        }

        Some(entry)
    }

    fn persist_durable(&self, key: &K, serialized: &str) {
        let Some(store) = &self.durable else {
            return;
        };
        if let Err(error) = store.persist_entry(&self.namespaced(key), serialized) {
            warn!(
                "Failed to save to durable cache {}: {error}",
                self.namespaced(key)
            );
        }
    }

    fn namespace_prefix(&self) -> String {
        format!("{}{KEY_SEPARATOR}", self.config.namespace)
    }

    fn namespaced(&self, key: &K) -> String {
        format!("{}{KEY_SEPARATOR}{key}", self.config.namespace)
    }
}

impl<K: Eq + Hash + Clone, V> TieredCache<K, V> {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Eq + Hash + Clone, V> Drop for TieredCache<K, V> {
    fn drop(&mut self) {
        let now = self.clock.now();
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        prune(entries, now, self.config.capacity);
    }
}

fn prune<K: Eq + Hash + Clone, V>(
    entries: &mut HashMap<K, CacheEntry<V>>,
    now: DateTime<Utc>,
    capacity: usize,
) {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    let expired = before - entries.len();

    let mut evicted = 0;
    if entries.len() > capacity {
        let mut by_age: Vec<(DateTime<Utc>, K)> = entries
            .iter()
            .map(|(key, entry)| (entry.stored_at, key.clone()))
            .collect();
        by_age.sort_by_key(|(stored_at, _)| *stored_at);

        let excess = entries.len() - capacity;
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
            evicted += 1;
        }
    }

    if expired > 0 || evicted > 0 {
        debug!("Cache cleanup: {expired} expired, {evicted} evicted over capacity {capacity}");
    }
}
