//! Error types for path writes
//!
//! Reads never fail (a missing location is simply absent) and parsing never
//! fails, so every variant here describes a structural problem met while
//! writing. Such an error aborts only the single write that raised it.
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

use thiserror::Error;

/// Structural errors raised by the path writer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    /// The path parsed to zero segments
    #[error("Empty path")]
    EmptyPath,

    /// The tree handed to the writer is not an object
    #[error("Write target is not an object (found {found})")]
    InvalidTarget { found: String },

    /// A predicate segment addressed an object instead of an array
    #[error("Predicate segment '{segment}' applied to an object at {path}")]
    PredicateOnObject { segment: String, path: String },

    /// An index segment addressed an object instead of an array
    #[error("Index segment [{index}] applied to an object at {path}")]
    IndexOnObject { index: usize, path: String },

    /// The writer met a scalar where it needed to descend
    #[error("Cannot descend into {found} at {path}")]
    NotAContainer { path: String, found: String },

    /// A broadcast write found no object element to write into
    #[error("No object element to write into at {path}")]
    NoWritableElement { path: String },
}

/// JSON type name used in error messages
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
