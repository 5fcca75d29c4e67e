//! Error types and handling for the CLI
//!
//! Every variant maps to a distinct process exit code.

use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from fhirmap-core library
    #[error("{0}")]
    Core(#[from] fhirmap_core::Error),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `check` found mappings that cannot run
    #[error("{count} mapping(s) failed the check")]
    InvalidMappings { count: usize },

    /// The run finished but rejected some items
    #[error("{rejected} of {read} items were rejected")]
    ItemErrors { rejected: u64, read: u64 },

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(_) => 2,
            Self::FileNotFound { .. } => 3,
            Self::InvalidMappings { .. } => 4,
            Self::Config(_) => 5,
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::ItemErrors { .. } => 14,
            Self::Other { .. } => 99,
        }
    }

    /// Follow-up hint shown under the error, if any
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Core(core) if core.is_configuration_error() => {
                Some("Run 'fhirmap check' to list the problems of every mapping in the store")
            }
            Self::Config(_) => Some("Pass --store or set FHIRMAP_STORE, or add 'store' to the config file"),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::other(format!("{error:#}"))
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    let mut rendered = if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    };

    if let Error::Core(fhirmap_core::Error::InvalidMapping { problems, .. }) = error {
        for problem in problems {
            rendered.push_str("\n  - ");
            rendered.push_str(problem);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::Io(io::Error::other("disk")),
            Error::Core(fhirmap_core::Error::ConfigNotFound {
                identifier: "x".to_string(),
            }),
            Error::FileNotFound {
                path: PathBuf::from("in.csv"),
            },
            Error::InvalidMappings { count: 2 },
            Error::config("no store"),
            Error::ItemErrors { rejected: 1, read: 3 },
            Error::other("boom"),
        ];
        let codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 14, 99]);
    }

    #[test]
    fn test_invalid_mapping_lists_problems() {
        let error = Error::Core(fhirmap_core::Error::InvalidMapping {
            config: "patients".to_string(),
            problems: vec!["first".to_string(), "second".to_string()],
        });
        let rendered = format_error(&error, false);
        assert!(rendered.starts_with("Error: Invalid mapping 'patients'"));
        assert!(rendered.ends_with("\n  - first\n  - second"));
        assert!(error.hint().is_some());
    }
}
