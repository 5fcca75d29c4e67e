//! In-process cache with TTL expiry and LRU eviction

use super::CacheService;
use crate::config::CacheConfig;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Cache entry holding a serialized value and its expiry data
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    cached_at: SystemTime,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn new(payload: String, ttl: Option<Duration>) -> Self {
        Self {
            payload,
            cached_at: SystemTime::now(),
            ttl,
        }
    }

    fn is_live(&self) -> bool {
        match (self.ttl, self.cached_at.elapsed()) {
            (Some(ttl), Ok(elapsed)) => elapsed < ttl,
            _ => true,
        }
    }

    fn age(&self) -> Option<Duration> {
        self.cached_at.elapsed().ok()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    access_order: Vec<String>,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.to_string());
    }

    fn remove(&mut self, key: &str) -> bool {
        self.access_order.retain(|k| k != key);
        self.entries.remove(key).is_some()
    }

    fn evict_lru(&mut self) {
        if let Some(oldest) = self.access_order.first().cloned() {
            self.remove(&oldest);
        }
    }

    fn purge_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// Thread-safe in-memory [`CacheService`]
#[derive(Debug)]
pub struct InMemoryCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        self.lock().purge_expired()
    }

    /// Remove all entries and reset counters
    pub fn clear(&self) {
        *self.lock() = Inner::default();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let ages: Vec<Duration> = inner.entries.values().filter_map(CacheEntry::age).collect();
        let average_age = if ages.is_empty() {
            None
        } else {
            Some(ages.iter().sum::<Duration>() / ages.len() as u32)
        };

        CacheStats {
            total_entries: inner.entries.len(),
            max_entries: self.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            average_age,
            enabled: self.config.enabled,
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let mut inner = self.lock();
        let live = inner.entries.get(key).map(CacheEntry::is_live);
        match live {
            Some(true) => {
                inner.hits += 1;
                inner.touch(key);
                Ok(inner.entries.get(key).map(|entry| entry.payload.clone()))
            }
            Some(false) => {
                inner.remove(key);
                inner.misses += 1;
                Ok(None)
            }
            None => {
                inner.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        if !self.config.enabled || self.config.max_entries == 0 {
            return Ok(());
        }
        let mut inner = self.lock();
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.config.max_entries {
            if inner.purge_expired() == 0 {
                inner.evict_lru();
            }
        }
        let ttl = ttl.or(self.config.default_ttl);
        inner.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        inner.touch(key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.lock().remove(key))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.lock();
        let mut keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        let mut inner = self.lock();
        Ok(keys.iter().filter(|key| inner.remove(key)).count())
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub average_age: Option<Duration>,
    pub enabled: bool,
}

impl CacheStats {
    /// Cache utilization as a percentage
    pub fn utilization(&self) -> f64 {
        if self.max_entries == 0 {
            0.0
        } else {
            (self.total_entries as f64 / self.max_entries as f64) * 100.0
        }
    }

    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
