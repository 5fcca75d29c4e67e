//! Built-in validation functions

use super::types::{detail_str, detail_usize, text_of, FunctionContext, ValidationFn};
use crate::path::is_empty_value;
use crate::types::FunctionDetails;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Fails on null, empty string, empty array and empty object
pub fn required(value: &Value, _details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Option<String> {
    is_empty_value(value).then(|| "Value is required".to_string())
}

/// Full-match regular expression check with a per-function pattern cache
pub fn regex() -> ValidationFn {
    let compiled: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());

    Arc::new(move |value, details, _ctx| {
        let Some(pattern) = detail_str(details, "pattern") else {
            return Some("REGEX validation requires a 'pattern' detail".to_string());
        };

        let text = text_of(value);
        let mut cache = match compiled.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !cache.contains_key(pattern) {
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(re) => {
                    cache.insert(pattern.to_string(), re);
                }
                Err(e) => return Some(format!("Invalid regex pattern '{pattern}': {e}")),
            }
        }

        let matched = cache.get(pattern).is_some_and(|re| re.is_match(&text));
        (!matched).then(|| format!("Value '{text}' does not match pattern '{pattern}'"))
    })
}

/// Character count must be at least `length` (alias `min`)
pub fn min_length(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Option<String> {
    let Some(min) = detail_usize(details, "length").or_else(|| detail_usize(details, "min")) else {
        return Some("MIN_LENGTH validation requires a numeric 'length' detail".to_string());
    };
    let count = text_of(value).chars().count();
    (count < min).then(|| format!("Length {count} is below the minimum of {min}"))
}

/// Character count must be at most `length` (alias `max`)
pub fn max_length(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Option<String> {
    let Some(max) = detail_usize(details, "length").or_else(|| detail_usize(details, "max")) else {
        return Some("MAX_LENGTH validation requires a numeric 'length' detail".to_string());
    };
    let count = text_of(value).chars().count();
    (count > max).then(|| format!("Length {count} exceeds the maximum of {max}"))
}

/// Value-set membership; accepts every value
pub fn valueset(value: &Value, details: &FunctionDetails, _ctx: &FunctionContext<'_>) -> Option<String> {
    tracing::debug!(
        value_set = detail_str(details, "valueSetUrl").unwrap_or("<unset>"),
        value = %text_of(value),
        "value set membership is not checked"
    );
    None
}
