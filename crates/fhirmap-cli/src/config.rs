//! Configuration management for the CLI
//!
//! This module handles loading configuration from:
//! - Default values
//! - Configuration files (YAML/JSON)
//! - Environment variables
//! - Command-line arguments
//!
//! It also reads the store file that holds mappings and schemas.

use crate::error::{Error, Result};
use fhirmap_core::{CacheConfig, DeliveryConfig, PipelineConfig, RemoteSourceConfig, RetryPolicy, StoreDocument};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store file with mappings and schemas
    pub store: Option<PathBuf>,

    /// Pipeline settings
    pub pipeline: PipelineConfig,

    /// Metadata cache settings
    pub cache: CacheConfig,

    /// Target server settings
    pub server: ServerConfig,

    /// Logging settings
    pub logging: LoggingSection,
}

/// Target server used by `extract` and `transform --deliver`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub page_size: usize,
    pub page_buffer: usize,
    pub retry: RetryPolicy,
}

/// Logging settings from the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level filter, overridden by `-v` and `RUST_LOG`
    pub level: Option<String>,
    /// compact, full or json
    pub format: Option<String>,
    /// Log file path
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let remote = RemoteSourceConfig::default();
        Self {
            base_url: None,
            timeout_secs: remote.timeout_secs,
            page_size: remote.page_size,
            page_buffer: remote.page_buffer,
            retry: remote.retry_policy,
        }
    }
}

impl ServerConfig {
    fn base_url(&self, override_url: Option<&str>) -> Result<String> {
        override_url
            .map(str::to_string)
            .or_else(|| self.base_url.clone())
            .ok_or_else(|| Error::config("no server URL; pass --server or set server.base_url"))
    }

    /// Remote source settings, `override_url` taking precedence
    pub fn remote_source(&self, override_url: Option<&str>) -> Result<RemoteSourceConfig> {
        Ok(RemoteSourceConfig {
            base_url: self.base_url(override_url)?,
            timeout_secs: self.timeout_secs,
            page_size: self.page_size,
            page_buffer: self.page_buffer,
            retry_policy: self.retry.clone(),
        })
    }

    pub fn delivery(&self) -> Result<DeliveryConfig> {
        Ok(DeliveryConfig {
            base_url: self.base_url(None)?,
            timeout_secs: self.timeout_secs,
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("yaml") | Some("yml"))
}

/// Read a YAML or JSON document, chosen by extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    if is_yaml(path) {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        read_document(path)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        // logging is not up yet
                        eprintln!("Warning: Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations, then apply environment overrides
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `FHIRMAP_STORE` and `FHIRMAP_SERVER_URL`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(store) = var("FHIRMAP_STORE").filter(|s| !s.is_empty()) {
            self.store = Some(PathBuf::from(store));
        }
        if let Some(url) = var("FHIRMAP_SERVER_URL").filter(|s| !s.is_empty()) {
            self.server.base_url = Some(url);
        }
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".fhirmap.yaml"), PathBuf::from(".fhirmap.json")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("fhirmap").join("config.yaml"));
        }
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".config").join("fhirmap").join("config.yaml"));
        }
        paths.dedup();
        paths
    }

    /// Store file path, the command-line value taking precedence
    pub fn store_path(&self, cli_store: Option<&Path>) -> Result<PathBuf> {
        cli_store
            .map(Path::to_path_buf)
            .or_else(|| self.store.clone())
            .ok_or_else(|| Error::config("no store file configured"))
    }

    /// Read the store document
    pub fn load_store(&self, cli_store: Option<&Path>) -> Result<StoreDocument> {
        let path = self.store_path(cli_store)?;
        tracing::debug!(path = %path.display(), "loading store");
        read_document(&path)
    }
}
