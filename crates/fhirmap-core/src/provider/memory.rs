//! In-memory configuration store

use super::{ConfigProvider, MutationListener, SchemaFilter, SchemaQuery};
use crate::types::{MappingConfiguration, SchemaElement};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Element list of one resource type or profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub elements: Vec<SchemaElement>,
}

impl SchemaDocument {
    pub fn query(&self) -> SchemaQuery {
        SchemaQuery::new(self.resource_type.clone(), self.url.clone())
    }

    fn answers(&self, query: &SchemaQuery) -> bool {
        match &query.url {
            Some(url) => self.url.as_deref() == Some(url.as_str()),
            None => self.resource_type == query.resource_type,
        }
    }
}

/// Serialized store contents: mappings plus schemas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub mappings: Vec<MappingConfiguration>,
    pub schemas: Vec<SchemaDocument>,
}

#[derive(Default)]
struct State {
    configs: Vec<MappingConfiguration>,
    schemas: Vec<SchemaDocument>,
    listeners: Vec<Arc<dyn MutationListener>>,
}

/// Store held in process memory
///
/// Every upsert notifies the registered listeners after the write lands.
#[derive(Default)]
pub struct InMemoryConfigProvider {
    state: RwLock<State>,
    config_reads: AtomicUsize,
    schema_reads: AtomicUsize,
}

impl InMemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: StoreDocument) -> Self {
        let provider = Self::new();
        {
            let mut state = provider.write();
            state.configs = document.mappings;
            state.schemas = document.schemas;
        }
        provider
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MutationListener>) {
        self.write().listeners.push(listener);
    }

    fn listeners(&self) -> Vec<Arc<dyn MutationListener>> {
        self.read().listeners.clone()
    }

    /// Insert or replace a configuration (matched by id)
    pub async fn upsert_config(&self, config: MappingConfiguration) -> Result<()> {
        let previous = {
            let mut state = self.write();
            match state.configs.iter_mut().find(|c| c.id == config.id) {
                Some(slot) => Some(std::mem::replace(slot, config.clone())),
                None => {
                    state.configs.push(config.clone());
                    None
                }
            }
        };

        for listener in self.listeners() {
            if let Some(previous) = &previous {
                listener.config_changed(previous).await?;
            }
            listener.config_changed(&config).await?;
        }
        Ok(())
    }

    /// Insert or replace a schema (matched by resource type and URL)
    pub async fn upsert_schema(&self, document: SchemaDocument) -> Result<()> {
        let query = document.query();
        {
            let mut state = self.write();
            match state
                .schemas
                .iter_mut()
                .find(|s| s.resource_type == document.resource_type && s.url == document.url)
            {
                Some(slot) => *slot = document,
                None => state.schemas.push(document),
            }
        }

        for listener in self.listeners() {
            listener.schema_changed(&query).await?;
        }
        Ok(())
    }

    /// Remove a configuration by id
    pub async fn remove_config(&self, id: &str) -> Result<bool> {
        let removed = {
            let mut state = self.write();
            let position = state.configs.iter().position(|c| c.id == id);
            position.map(|position| state.configs.remove(position))
        };
        let Some(removed) = removed else {
            return Ok(false);
        };
        for listener in self.listeners() {
            listener.config_changed(&removed).await?;
        }
        Ok(true)
    }

    /// Snapshot of the store contents
    pub fn document(&self) -> StoreDocument {
        let state = self.read();
        StoreDocument {
            mappings: state.configs.clone(),
            schemas: state.schemas.clone(),
        }
    }

    /// Number of `mapping_config` reads served
    pub fn config_reads(&self) -> usize {
        self.config_reads.load(Ordering::Relaxed)
    }

    /// Number of `schema_elements` reads served
    pub fn schema_reads(&self) -> usize {
        self.schema_reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConfigProvider for InMemoryConfigProvider {
    async fn mapping_config(&self, identifier: &str) -> Result<Option<MappingConfiguration>> {
        self.config_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .read()
            .configs
            .iter()
            .find(|c| c.is_identified_by(identifier))
            .cloned())
    }

    async fn schema_elements(&self, query: &SchemaQuery, filter: SchemaFilter) -> Result<Vec<SchemaElement>> {
        self.schema_reads.fetch_add(1, Ordering::Relaxed);
        let state = self.read();
        let document = state
            .schemas
            .iter()
            .filter(|s| s.answers(query))
            // a plain resource-type query prefers the base definition
            .min_by_key(|s| s.url.is_some());
        Ok(document
            .map(|s| s.elements.iter().filter(|e| filter.matches(e)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SourceFormat};
    use std::sync::Mutex;

    fn config(id: &str, name: &str) -> MappingConfiguration {
        MappingConfiguration {
            id: id.to_string(),
            name: name.to_string(),
            source_format: SourceFormat::Tabular,
            target_resource_type: "Patient".to_string(),
            direction: Direction::ToTarget,
            schema_url: None,
            field_mappings: vec![],
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MutationListener for Recorder {
        async fn config_changed(&self, config: &MappingConfiguration) -> Result<()> {
            self.events.lock().unwrap().push(format!("config:{}", config.name));
            Ok(())
        }

        async fn schema_changed(&self, query: &SchemaQuery) -> Result<()> {
            self.events.lock().unwrap().push(format!("schema:{}", query.cache_scope()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lookup_by_id_or_name() {
        let provider = InMemoryConfigProvider::from_document(StoreDocument {
            mappings: vec![config("1", "patients")],
            schemas: vec![],
        });
        assert!(provider.mapping_config("1").await.unwrap().is_some());
        assert!(provider.mapping_config("patients").await.unwrap().is_some());
        assert!(provider.mapping_config("other").await.unwrap().is_none());
        assert_eq!(provider.config_reads(), 3);
    }

    #[tokio::test]
    async fn test_schema_filters_and_url_preference() {
        let provider = InMemoryConfigProvider::from_document(StoreDocument {
            mappings: vec![],
            schemas: vec![
                SchemaDocument {
                    resource_type: "Patient".to_string(),
                    url: Some("http://profile".to_string()),
                    elements: vec![SchemaElement::new("Patient.gender", 1, Some("1"))],
                },
                SchemaDocument {
                    resource_type: "Patient".to_string(),
                    url: None,
                    elements: vec![
                        SchemaElement::new("Patient.gender", 0, Some("1")),
                        SchemaElement::new("Patient.active", 0, Some("1")).with_default("true", "boolean"),
                    ],
                },
            ],
        });

        let base = SchemaQuery::new("Patient", None);
        assert_eq!(provider.schema_elements(&base, SchemaFilter::All).await.unwrap().len(), 2);
        assert_eq!(provider.schema_elements(&base, SchemaFilter::FixedOrDefault).await.unwrap().len(), 1);
        assert!(provider.schema_elements(&base, SchemaFilter::Mandatory).await.unwrap().is_empty());

        let profile = SchemaQuery::new("Patient", Some("http://profile".to_string()));
        assert_eq!(provider.schema_elements(&profile, SchemaFilter::Mandatory).await.unwrap().len(), 1);

        let unknown = SchemaQuery::new("Observation", None);
        assert!(provider.schema_elements(&unknown, SchemaFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upserts_notify_listeners() {
        let provider = InMemoryConfigProvider::new();
        let recorder = Arc::new(Recorder::default());
        provider.add_listener(recorder.clone());

        provider.upsert_config(config("1", "old")).await.unwrap();
        provider.upsert_config(config("1", "new")).await.unwrap();
        provider
            .upsert_schema(SchemaDocument {
                resource_type: "Patient".to_string(),
                url: None,
                elements: vec![],
            })
            .await
            .unwrap();
        assert!(provider.remove_config("1").await.unwrap());
        assert!(!provider.remove_config("1").await.unwrap());

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["config:old", "config:old", "config:new", "schema:Patient", "config:new"]
        );
        assert!(provider.document().mappings.is_empty());
    }
}
