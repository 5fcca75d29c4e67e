//! Function signatures and shared helpers for the registry

use crate::types::FunctionDetails;
use serde_json::Value;
use std::sync::Arc;

/// Per-call context handed to every registered function
#[derive(Debug, Clone, Copy)]
pub struct FunctionContext<'a> {
    /// The whole source item the mapped value was read from
    pub source_item: &'a Value,
}

impl<'a> FunctionContext<'a> {
    pub fn new(source_item: &'a Value) -> Self {
        Self { source_item }
    }
}

/// Validation function: `Some(message)` on failure
pub type ValidationFn =
    Arc<dyn Fn(&Value, &FunctionDetails, &FunctionContext<'_>) -> Option<String> + Send + Sync>;

/// Transformation function: the new value or a failure message
pub type TransformationFn =
    Arc<dyn Fn(&Value, &FunctionDetails, &FunctionContext<'_>) -> Result<Value, String> + Send + Sync>;

/// Built-in function names
pub mod names {
    pub const REQUIRED: &str = "REQUIRED";
    pub const REGEX: &str = "REGEX";
    pub const MIN_LENGTH: &str = "MIN_LENGTH";
    pub const MAX_LENGTH: &str = "MAX_LENGTH";
    pub const VALUESET: &str = "VALUESET";

    pub const FORMAT_DATE: &str = "FORMAT_DATE";
    pub const STRING_CASE: &str = "STRING_CASE";
    pub const CODE_LOOKUP: &str = "CODE_LOOKUP";
    pub const CONCATENATE: &str = "CONCATENATE";
    pub const DEFAULT_VALUE: &str = "DEFAULT_VALUE";
}

/// Text form of a scalar: strings as-is, null as empty, anything else as JSON
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read a string detail
pub fn detail_str<'a>(details: &'a FunctionDetails, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str)
}

/// Read a non-negative integer detail given as a number or numeric string
pub fn detail_usize(details: &FunctionDetails, key: &str) -> Option<usize> {
    match details.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
