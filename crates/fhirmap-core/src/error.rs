//! Error types for the fhirmap core library
//!
//! This module defines the error taxonomy of the mapping engine. Configuration
//! level errors abort pipeline setup, source level errors terminate a running
//! stream, and item level errors never leave this crate as `Err` values: they
//! travel downstream inside [`StreamRecord::Error`](crate::types::StreamRecord).

use crate::path::PathError;
use thiserror::Error;

/// Main error type for fhirmap operations
#[derive(Error, Debug)]
pub enum Error {
    /// No mapping configuration exists for the identifier
    #[error("Mapping configuration not found: {identifier}")]
    ConfigNotFound { identifier: String },

    /// Required schema metadata is missing or empty
    #[error("Schema not processed for {}", describe_schema(.resource_type, .url))]
    SchemaNotProcessed {
        resource_type: Option<String>,
        url: Option<String>,
    },

    /// A configured mapping cannot be resolved against the schema or registry
    #[error("Invalid mapping '{config}': {}", .problems.join("; "))]
    InvalidMapping {
        config: String,
        problems: Vec<String>,
    },

    /// Malformed or unsupported source payload
    #[error("Invalid input data: {message}")]
    InvalidInputData {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The remote record source failed
    #[error("Remote source error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    RemoteSource {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// A field failed validation while processing one item
    #[error("Validation failed at {path}: {message}")]
    ItemValidation { path: String, message: String },

    /// A field failed transformation while processing one item
    #[error("Transformation failed at {path}: {message}")]
    ItemTransformation { path: String, message: String },

    /// Unexpected failure while processing one item
    #[error("Item processing failed: {message}")]
    ItemProcessing { message: String },

    /// Structural path read/write failure
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Cache service failure
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP transport errors not tied to a remote status
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

fn describe_schema(resource_type: &Option<String>, url: &Option<String>) -> String {
    match (resource_type, url) {
        (_, Some(url)) => format!("profile '{url}'"),
        (Some(rt), None) => format!("resource type '{rt}'"),
        (None, None) => "unspecified schema".to_string(),
    }
}

impl Error {
    /// Create an invalid input error without a source
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInputData {
            message: message.into(),
            source: None,
        }
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a remote source error
    pub fn remote(message: impl Into<String>, status: Option<u16>, body: Option<String>) -> Self {
        Self::RemoteSource {
            message: message.into(),
            status,
            body,
        }
    }

    /// Whether this error is raised while setting a pipeline up
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::SchemaNotProcessed { .. } | Self::InvalidMapping { .. }
        )
    }

    /// HTTP-equivalent status a caller should report for this error
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::ConfigNotFound { .. } => 404,
            Self::SchemaNotProcessed { .. } | Self::InvalidMapping { .. } => 422,
            Self::InvalidInputData { .. } | Self::Json { .. } => 400,
            Self::ItemValidation { .. } | Self::ItemTransformation { .. } => 422,
            Self::RemoteSource { .. } | Self::Http { .. } => 502,
            _ => 500,
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::InvalidInputData {
            message: format!("Malformed tabular input: {err}"),
            source: Some(err.into()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::RemoteSource {
                message: err.to_string(),
                status: Some(status.as_u16()),
                body: None,
            },
            None => Error::Http {
                message: err.to_string(),
                source: Some(err),
            },
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigNotFound {
            identifier: "patients-csv".to_string(),
        };
        assert_eq!(err.to_string(), "Mapping configuration not found: patients-csv");
    }

    #[test]
    fn test_schema_not_processed_prefers_url() {
        let err = Error::SchemaNotProcessed {
            resource_type: Some("Patient".to_string()),
            url: Some("http://example.org/StructureDefinition/p".to_string()),
        };
        assert!(err.to_string().contains("profile 'http://example.org/StructureDefinition/p'"));

        let err = Error::SchemaNotProcessed {
            resource_type: Some("Patient".to_string()),
            url: None,
        };
        assert!(err.to_string().contains("resource type 'Patient'"));
    }

    #[test]
    fn test_invalid_mapping_lists_problems() {
        let err = Error::InvalidMapping {
            config: "m".to_string(),
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid mapping 'm': a; b");
    }

    #[test]
    fn test_remote_error_includes_status() {
        let err = Error::remote("page fetch failed", Some(503), None);
        assert_eq!(err.to_string(), "Remote source error (status 503): page fetch failed");
        assert_eq!(err.status_hint(), 502);
    }

    #[test]
    fn test_status_hints() {
        assert_eq!(Error::ConfigNotFound { identifier: "x".into() }.status_hint(), 404);
        assert_eq!(Error::invalid_input("bad").status_hint(), 400);
        assert_eq!(Error::cache("down").status_hint(), 500);
        assert!(Error::InvalidMapping { config: "c".into(), problems: vec![] }.is_configuration_error());
        assert!(!Error::invalid_input("bad").is_configuration_error());
    }
}
