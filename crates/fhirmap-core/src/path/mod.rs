//! Mapping path algebra
//!
//! This module reads and writes deeply nested locations inside a
//! `serde_json::Value` tree. Paths are dotted property chains with three
//! extras:
//!
//! - `name[2]` addresses an array position
//! - `name:slice` addresses a named slice of a repeating element
//! - `name[?key='value']` selects (or creates) the array element whose
//!   `key` equals `value`
//!
//! Reading is pure and never creates structure. Writing creates missing
//! intermediates, consulting the schema to decide whether a new container
//! is an array or an object.
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

pub mod container;
pub mod error;
pub mod parser;
pub mod reader;
pub mod writer;


pub use container::{decide_container, ContainerDecision, ContainerKind, REPEATING_NAMES};
pub use error::PathError;
pub use parser::{base_path, parse_path, render_path, strip_indices, strip_slices, PathSegment};
pub use reader::{read, read_segments};
pub use writer::PathWriter;

use crate::schema::SchemaIndex;
use serde_json::Value;

/// Write `value` at `path` with a writer rooted at the schema's resource type
pub fn write(tree: &mut Value, path: &str, value: Value, schema: &SchemaIndex) -> Result<(), PathError> {
    PathWriter::new(schema).write(tree, path, value)
}

/// Whether any location addressed by `path` holds a non-empty value
///
/// Unlike [`read`], arrays met along the way are searched element-wise, so
/// `name.given` is present when any `name[i].given` is.
pub fn has_value(tree: &Value, path: &str) -> bool {
    let segments = parse_path(path);
    !segments.is_empty() && reaches(tree, &segments)
}

fn reaches(node: &Value, segments: &[PathSegment]) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return !is_empty_value(node);
    };
    match (node, segment) {
        (Value::Array(items), PathSegment::Index(index)) => {
            items.get(*index).is_some_and(|item| reaches(item, rest))
        }
        (Value::Array(items), PathSegment::Predicate { key, value }) => items
            .iter()
            .filter(|item| item.get(key).and_then(Value::as_str) == Some(value.as_str()))
            .any(|item| reaches(item, rest)),
        (Value::Array(items), _) => items.iter().any(|item| reaches(item, segments)),
        (Value::Object(map), PathSegment::Property(name) | PathSegment::SlicedProperty { name, .. }) => {
            map.get(name).is_some_and(|child| reaches(child, rest))
        }
        _ => false,
    }
}

/// Null, empty string, empty array and empty object count as empty
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_then_read() {
        let schema = SchemaIndex::empty("Patient");
        let mut tree = json!({"resourceType": "Patient"});
        write(&mut tree, "birthDate", json!("2023-01-15"), &schema).unwrap();
        assert_eq!(read(&tree, "birthDate"), Some(&json!("2023-01-15")));
    }

    #[test]
    fn test_has_value_fans_out_over_arrays() {
        let tree = json!({
            "name": [{"family": "A"}, {"given": ["Ana"]}],
            "identifier": [{"system": "urn:cns", "value": ""}],
            "gender": null
        });
        assert!(has_value(&tree, "name.given"));
        assert!(has_value(&tree, "name.family"));
        assert!(!has_value(&tree, "name.text"));
        assert!(!has_value(&tree, "identifier.value"));
        assert!(has_value(&tree, "identifier[?system='urn:cns'].system"));
        assert!(!has_value(&tree, "identifier[?system='other'].system"));
        assert!(!has_value(&tree, "gender"));
        assert!(!has_value(&tree, ""));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
    }
}
