//! Typed cache-aside helper over a [`CacheService`]

use super::CacheService;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Serde-typed cache-aside access to metadata
#[derive(Clone)]
pub struct MetadataCache {
    service: Arc<dyn CacheService>,
    default_ttl: Option<Duration>,
}

impl MetadataCache {
    pub fn new(service: Arc<dyn CacheService>) -> Self {
        Self {
            service,
            default_ttl: None,
        }
    }

    /// TTL used when a call does not name one
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn service(&self) -> &Arc<dyn CacheService> {
        &self.service
    }

    /// Return the cached value for `key`, loading and storing it on a miss
    ///
    /// A `None` from the loader is passed through and not cached. Cache
    /// failures never fail the lookup: a corrupt entry or an unavailable
    /// service is logged and the loader is used instead.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, loader: F, ttl: Option<Duration>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        match self.service.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    tracing::trace!(key, "metadata cache hit");
                    return Ok(Some(value));
                }
                Err(e) => tracing::warn!(key, error = %e, "discarding corrupt cache entry"),
            },
            Ok(None) => tracing::trace!(key, "metadata cache miss"),
            Err(e) => tracing::warn!(key, error = %e, "cache read failed, loading from source"),
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            match serde_json::to_string(value) {
                Ok(payload) => {
                    if let Err(e) = self.service.set(key, payload, ttl.or(self.default_ttl)).await {
                        tracing::warn!(key, error = %e, "cache write failed");
                    }
                }
                Err(e) => tracing::warn!(key, error = %e, "value not cacheable"),
            }
        }
        Ok(loaded)
    }

    /// Drop one key
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.service.delete(key).await?;
        tracing::debug!(key, removed, "invalidated cache key");
        Ok(removed)
    }

    /// Drop every key starting with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.service.scan_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.service.delete_many(&keys).await?;
        tracing::debug!(prefix, removed, "invalidated cache prefix");
        Ok(removed)
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
