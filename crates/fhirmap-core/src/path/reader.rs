//! Read-only path resolution
//!
//! Dot and bracket-index traversal only. Predicates are not evaluated on
//! read and always resolve to absent.

use super::parser::{parse_path, PathSegment};
use serde_json::Value;

/// Resolve `path` against `tree`
pub fn read<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    read_segments(tree, &parse_path(path))
}

/// Resolve pre-parsed segments against `tree`
pub fn read_segments<'a>(tree: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    if segments.is_empty() {
        return None;
    }
    segments.iter().try_fold(tree, |node, segment| match segment {
        PathSegment::Property(name) | PathSegment::SlicedProperty { name, .. } => {
            node.as_object()?.get(name)
        }
        PathSegment::Index(index) => node.as_array()?.get(*index),
        PathSegment::Predicate { .. } => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "resourceType": "Patient",
            "name": [{"family": "Silva", "given": ["Ana", "Maria"]}],
            "identifier": [{"system": "urn:cns", "value": "123"}],
            "deceasedBoolean": null
        })
    }

    #[test]
    fn test_read_nested_properties() {
        let tree = sample();
        assert_eq!(read(&tree, "name[0].family"), Some(&json!("Silva")));
        assert_eq!(read(&tree, "name[0].given[1]"), Some(&json!("Maria")));
        assert_eq!(read(&tree, "resourceType"), Some(&json!("Patient")));
    }

    #[test]
    fn test_read_missing_and_wrong_shape() {
        let tree = sample();
        assert_eq!(read(&tree, "name[3].family"), None);
        assert_eq!(read(&tree, "name.family"), None);
        assert_eq!(read(&tree, "resourceType.length"), None);
        assert_eq!(read(&tree, "missing"), None);
        assert_eq!(read(&tree, ""), None);
    }

    #[test]
    fn test_read_predicate_is_absent() {
        let tree = sample();
        assert_eq!(read(&tree, "identifier[?system='urn:cns'].value"), None);
    }

    #[test]
    fn test_read_slice_uses_name() {
        let tree = sample();
        assert_eq!(read(&tree, "identifier:cns[0].value"), Some(&json!("123")));
    }

    #[test]
    fn test_read_null_leaf_is_present() {
        let tree = sample();
        assert_eq!(read(&tree, "deceasedBoolean"), Some(&Value::Null));
    }
}
