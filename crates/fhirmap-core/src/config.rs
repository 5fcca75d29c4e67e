//! Runtime configuration for the engine and its adapters
//!
//! Every struct here deserializes from a partial document: missing fields
//! take their `Default` value.

use crate::remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the bounded channel between stages
    pub channel_capacity: usize,

    /// TTL of metadata cached on behalf of pipeline setup
    #[serde(with = "duration_secs")]
    pub cache_ttl: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            cache_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl PipelineConfig {
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// In-memory cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,

    /// TTL applied when a write does not name one
    #[serde(with = "duration_secs")]
    pub default_ttl: Option<Duration>,

    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
            enabled: true,
        }
    }
}

/// Paginated remote record source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSourceConfig {
    /// Server base URL, e.g. `https://fhir.example.org/fhir`
    pub base_url: String,
    pub timeout_secs: u64,
    /// `_count` requested per page
    pub page_size: usize,
    /// Resources buffered ahead of the consumer
    pub page_buffer: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for RemoteSourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
            page_size: 100,
            page_buffer: 128,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl RemoteSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Outbound delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// `Option<Duration>` as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
