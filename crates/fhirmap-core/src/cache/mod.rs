//! Cache-aside metadata layer
//!
//! Mapping configurations and schema element lists are read once per
//! pipeline run but change rarely, so lookups go through a [`CacheService`]
//! first. Values are stored as serialized JSON; the typed view lives in
//! [`MetadataCache`].
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

pub mod memory;
pub mod metadata;

pub use memory::{CacheStats, InMemoryCache};
pub use metadata::MetadataCache;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Key/value store holding serialized metadata
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Fetch a live entry
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store an entry; `None` TTL uses the service default
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Remove one entry, reporting whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove several entries, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize>;
}

/// Cache key layout
pub mod keys {
    use crate::provider::{SchemaFilter, SchemaQuery};

    pub const ROOT: &str = "fhirmap:";
    pub const CONFIG_PREFIX: &str = "fhirmap:config:";
    pub const SCHEMA_PREFIX: &str = "fhirmap:schema:";

    /// `fhirmap:config:{identifier}`
    pub fn config(identifier: &str) -> String {
        format!("{CONFIG_PREFIX}{identifier}")
    }

    /// `fhirmap:schema:{all|fixed|mandatory}:{url or resourceType}`
    pub fn schema(query: &SchemaQuery, filter: SchemaFilter) -> String {
        format!("{SCHEMA_PREFIX}{}:{}", filter.as_str(), query.cache_scope())
    }

    /// Keys of every filter for one schema scope
    pub fn schema_scopes(scope: &str) -> Vec<String> {
        SchemaFilter::ALL
            .iter()
            .map(|filter| format!("{SCHEMA_PREFIX}{}:{scope}", filter.as_str()))
            .collect()
    }
}
