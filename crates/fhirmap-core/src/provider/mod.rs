//! Mapping configuration and schema metadata providers
//!
//! The engine reads configurations and schema elements through
//! [`ConfigProvider`] and never sees the store behind it. Stores that cache
//! must be told about mutations through [`MutationListener`].

pub mod cached;
pub mod memory;

pub use cached::CachedConfigProvider;
pub use memory::{InMemoryConfigProvider, SchemaDocument, StoreDocument};

use crate::types::{MappingConfiguration, SchemaElement};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which schema to load: a profile URL or a base resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaQuery {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SchemaQuery {
    pub fn new(resource_type: impl Into<String>, url: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            url,
        }
    }

    /// Query for the schema a mapping configuration targets
    pub fn for_config(config: &MappingConfiguration) -> Self {
        Self::new(config.target_resource_type.clone(), config.schema_url.clone())
    }

    /// URL when present, else the resource type
    pub fn cache_scope(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.resource_type)
    }
}

impl fmt::Display for SchemaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} ({url})", self.resource_type),
            None => write!(f, "{}", self.resource_type),
        }
    }
}

/// Subset of schema elements to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFilter {
    All,
    FixedOrDefault,
    Mandatory,
}

impl SchemaFilter {
    pub const ALL: [SchemaFilter; 3] = [SchemaFilter::All, SchemaFilter::FixedOrDefault, SchemaFilter::Mandatory];

    /// Short name used in cache keys
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaFilter::All => "all",
            SchemaFilter::FixedOrDefault => "fixed",
            SchemaFilter::Mandatory => "mandatory",
        }
    }

    pub fn matches(self, element: &SchemaElement) -> bool {
        match self {
            SchemaFilter::All => true,
            SchemaFilter::FixedOrDefault => element.has_fixed_or_default(),
            SchemaFilter::Mandatory => element.is_mandatory(),
        }
    }
}

/// Source of mapping configurations and schema metadata
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Configuration by id or unique name
    async fn mapping_config(&self, identifier: &str) -> Result<Option<MappingConfiguration>>;

    /// Schema elements for `query`; empty when the schema is unknown
    async fn schema_elements(&self, query: &SchemaQuery, filter: SchemaFilter) -> Result<Vec<SchemaElement>>;
}

/// Notified by a store after every mutation it commits
#[async_trait]
pub trait MutationListener: Send + Sync {
    async fn config_changed(&self, config: &MappingConfiguration) -> Result<()>;

    async fn schema_changed(&self, query: &SchemaQuery) -> Result<()>;
}
