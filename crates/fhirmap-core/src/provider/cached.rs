//! Cache-aside decorator for any [`ConfigProvider`]

use super::{ConfigProvider, MutationListener, SchemaFilter, SchemaQuery};
use crate::cache::{keys, MetadataCache};
use crate::types::{MappingConfiguration, SchemaElement};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Serves lookups from the metadata cache, falling back to the wrapped provider
///
/// Register it as a [`MutationListener`] on the wrapped store so that
/// mutations evict stale entries.
pub struct CachedConfigProvider {
    inner: Arc<dyn ConfigProvider>,
    cache: MetadataCache,
    ttl: Option<Duration>,
}

impl CachedConfigProvider {
    pub fn new(inner: Arc<dyn ConfigProvider>, cache: MetadataCache) -> Self {
        Self {
            inner,
            cache,
            ttl: None,
        }
    }

    /// TTL for entries written by this provider
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}

#[async_trait]
impl ConfigProvider for CachedConfigProvider {
    async fn mapping_config(&self, identifier: &str) -> Result<Option<MappingConfiguration>> {
        let inner = Arc::clone(&self.inner);
        self.cache
            .get_or_set(
                &keys::config(identifier),
                || async move { inner.mapping_config(identifier).await },
                self.ttl,
            )
            .await
    }

    async fn schema_elements(&self, query: &SchemaQuery, filter: SchemaFilter) -> Result<Vec<SchemaElement>> {
        let inner = Arc::clone(&self.inner);
        let elements = self
            .cache
            .get_or_set(
                &keys::schema(query, filter),
                || async move {
                    let elements = inner.schema_elements(query, filter).await?;
                    // unknown schemas are not cached, so a later ingest is seen at once
                    Ok((!elements.is_empty()).then_some(elements))
                },
                self.ttl,
            )
            .await?;
        Ok(elements.unwrap_or_default())
    }
}

#[async_trait]
impl MutationListener for CachedConfigProvider {
    async fn config_changed(&self, config: &MappingConfiguration) -> Result<()> {
        self.cache.invalidate(&keys::config(&config.id)).await?;
        self.cache.invalidate(&keys::config(&config.name)).await?;
        Ok(())
    }

    async fn schema_changed(&self, query: &SchemaQuery) -> Result<()> {
        let mut scopes = vec![query.resource_type.as_str()];
        if let Some(url) = &query.url {
            scopes.push(url);
        }
        for scope in scopes {
            for key in keys::schema_scopes(scope) {
                self.cache.invalidate_prefix(&key).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::provider::{InMemoryConfigProvider, SchemaDocument};
    use crate::types::{Direction, SourceFormat};

    fn config(name: &str, resource_type: &str) -> MappingConfiguration {
        MappingConfiguration {
            id: "1".to_string(),
            name: name.to_string(),
            source_format: SourceFormat::JsonLike,
            target_resource_type: resource_type.to_string(),
            direction: Direction::ToTarget,
            schema_url: None,
            field_mappings: vec![],
        }
    }

    fn schema(paths: &[&str]) -> SchemaDocument {
        SchemaDocument {
            resource_type: "Patient".to_string(),
            url: None,
            elements: paths.iter().map(|p| SchemaElement::new(*p, 0, Some("1"))).collect(),
        }
    }

    async fn wired() -> (Arc<InMemoryConfigProvider>, Arc<CachedConfigProvider>) {
        let store = Arc::new(InMemoryConfigProvider::new());
        let cached = Arc::new(CachedConfigProvider::new(
            store.clone(),
            MetadataCache::new(Arc::new(InMemoryCache::new())),
        ));
        store.add_listener(cached.clone());
        store.upsert_config(config("patients", "Patient")).await.unwrap();
        store.upsert_schema(schema(&["Patient.gender"])).await.unwrap();
        (store, cached)
    }

    #[tokio::test]
    async fn test_repeated_lookups_hit_cache() {
        let (store, cached) = wired().await;
        let query = SchemaQuery::new("Patient", None);

        for _ in 0..3 {
            assert!(cached.mapping_config("patients").await.unwrap().is_some());
            assert_eq!(cached.schema_elements(&query, SchemaFilter::All).await.unwrap().len(), 1);
        }
        assert_eq!(store.config_reads(), 1);
        assert_eq!(store.schema_reads(), 1);
    }

    #[tokio::test]
    async fn test_mutations_invalidate() {
        let (store, cached) = wired().await;
        let query = SchemaQuery::new("Patient", None);

        cached.mapping_config("patients").await.unwrap();
        cached.schema_elements(&query, SchemaFilter::All).await.unwrap();

        store.upsert_config(config("patients", "Observation")).await.unwrap();
        store
            .upsert_schema(schema(&["Patient.gender", "Patient.active"]))
            .await
            .unwrap();

        let reloaded = cached.mapping_config("patients").await.unwrap().unwrap();
        assert_eq!(reloaded.target_resource_type, "Observation");
        assert_eq!(cached.schema_elements(&query, SchemaFilter::All).await.unwrap().len(), 2);
        assert_eq!(store.config_reads(), 2);
        assert_eq!(store.schema_reads(), 2);
    }

    #[tokio::test]
    async fn test_unknown_schema_is_not_cached() {
        let (store, cached) = wired().await;
        let query = SchemaQuery::new("Observation", None);
        assert!(cached.schema_elements(&query, SchemaFilter::All).await.unwrap().is_empty());
        assert!(cached.schema_elements(&query, SchemaFilter::All).await.unwrap().is_empty());
        assert_eq!(store.schema_reads(), 2);
    }
}
