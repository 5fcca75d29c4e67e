//! Structure-creating path writer
//!
//! The writer walks a parsed path one segment at a time, creating any
//! missing intermediate containers. While descending it carries the
//! absolute schema path of the current node (`Patient.identifier:cns`) so
//! that new containers can be shaped by the element's cardinality.
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

use super::container::{decide_container, ContainerKind};
use super::error::{type_name, PathError};
use super::parser::{parse_path, PathSegment};
use crate::schema::SchemaIndex;
use serde_json::{Map, Value};

/// Writes values into a JSON tree at mapping paths
#[derive(Debug, Clone)]
pub struct PathWriter<'a> {
    schema: &'a SchemaIndex,
    prefix: String,
    heuristics: bool,
}

impl<'a> PathWriter<'a> {
    /// Writer rooted at the schema's resource type, with name heuristics
    pub fn new(schema: &'a SchemaIndex) -> Self {
        Self {
            schema,
            prefix: schema.resource_type().to_string(),
            heuristics: true,
        }
    }

    /// Writer that treats unknown elements as objects
    pub fn without_heuristics(schema: &'a SchemaIndex) -> Self {
        Self {
            heuristics: false,
            ..Self::new(schema)
        }
    }

    /// Override the absolute-path prefix of the tree root
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Write `value` at `path`, logging and returning structural errors
    pub fn write(&self, tree: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
        let result = self.write_segments(tree, &parse_path(path), value);
        if let Err(err) = &result {
            log::warn!("Skipping write to '{path}': {err}");
        }
        result
    }

    /// Write `value` at pre-parsed `segments`
    pub fn write_segments(
        &self,
        tree: &mut Value,
        segments: &[PathSegment],
        value: Value,
    ) -> Result<(), PathError> {
        if segments.is_empty() {
            return Err(PathError::EmptyPath);
        }
        if !tree.is_object() {
            return Err(PathError::InvalidTarget {
                found: type_name(tree).to_string(),
            });
        }
        // A failed write leaves the tree as it was. Only the subtree under the
        // first segment can change, so that is all that is kept.
        let saved = match (&segments[0], tree.as_object()) {
            (PathSegment::Property(name) | PathSegment::SlicedProperty { name, .. }, Some(map)) => {
                Some((name.clone(), map.get(name).cloned()))
            }
            _ => None,
        };
        let result = self.write_node(tree, segments, value, &self.prefix);
        if result.is_err() {
            if let (Some((name, previous)), Value::Object(map)) = (saved, tree) {
                match previous {
                    Some(previous) => map.insert(name, previous),
                    None => map.remove(&name),
                };
            }
        }
        result
    }

    fn write_node(
        &self,
        node: &mut Value,
        segments: &[PathSegment],
        value: Value,
        prefix: &str,
    ) -> Result<(), PathError> {
        match node {
            Value::Object(map) => self.write_object(map, segments, value, prefix),
            Value::Array(items) => self.write_array(items, segments, value, prefix),
            other => Err(PathError::NotAContainer {
                path: prefix.to_string(),
                found: type_name(other).to_string(),
            }),
        }
    }

    fn write_object(
        &self,
        map: &mut Map<String, Value>,
        segments: &[PathSegment],
        value: Value,
        prefix: &str,
    ) -> Result<(), PathError> {
        let (segment, rest) = split(segments)?;
        let name = match segment {
            PathSegment::Property(name) | PathSegment::SlicedProperty { name, .. } => name,
            PathSegment::Index(index) => {
                return Err(PathError::IndexOnObject {
                    index: *index,
                    path: prefix.to_string(),
                })
            }
            PathSegment::Predicate { .. } => {
                return Err(PathError::PredicateOnObject {
                    segment: segment.to_string(),
                    path: prefix.to_string(),
                })
            }
        };

        if rest.is_empty() {
            map.insert(name.clone(), value);
            return Ok(());
        }

        let child_prefix = extend_prefix(prefix, segment);
        let child = map.entry(name.clone()).or_insert(Value::Null);
        if !is_container(child) {
            *child = self.new_container(&child_prefix, &rest[0]);
        }
        self.write_node(child, rest, value, &child_prefix)
    }

    fn write_array(
        &self,
        items: &mut Vec<Value>,
        segments: &[PathSegment],
        value: Value,
        prefix: &str,
    ) -> Result<(), PathError> {
        let (segment, rest) = split(segments)?;
        match segment {
            PathSegment::Index(index) => {
                let index = *index;
                let Some(next) = rest.first() else {
                    while items.len() <= index {
                        items.push(Value::Null);
                    }
                    items[index] = value;
                    return Ok(());
                };
                while items.len() < index {
                    items.push(Value::Object(Map::new()));
                }
                if items.len() == index {
                    items.push(element_container(next));
                } else if needs_new_element(&items[index], next) {
                    items[index] = element_container(next);
                }
                self.write_node(&mut items[index], rest, value, prefix)
            }
            PathSegment::Predicate { key, value: literal } => {
                let position = match items.iter().position(|item| matches_predicate(item, key, literal)) {
                    Some(position) => position,
                    None => {
                        let mut seed = Map::new();
                        seed.insert(key.clone(), Value::String(literal.clone()));
                        items.push(Value::Object(seed));
                        items.len() - 1
                    }
                };

                if rest.is_empty() {
                    replace_matched(&mut items[position], key, value);
                    return Ok(());
                }
                self.write_node(&mut items[position], rest, value, prefix)
            }
            PathSegment::Property(_) | PathSegment::SlicedProperty { .. } => {
                if items.is_empty() {
                    items.push(Value::Object(Map::new()));
                    return self.write_node(&mut items[0], segments, value, prefix);
                }

                let mut written = 0usize;
                for (position, item) in items.iter_mut().enumerate() {
                    if !item.is_object() {
                        log::warn!(
                            "Broadcast write at {prefix}: skipping non-object element {position} ({})",
                            type_name(item)
                        );
                        continue;
                    }
                    self.write_node(item, segments, value.clone(), prefix)?;
                    written += 1;
                }
                if written == 0 {
                    return Err(PathError::NoWritableElement {
                        path: extend_prefix(prefix, segment),
                    });
                }
                Ok(())
            }
        }
    }

    /// Fresh container for a child at `absolute_path` followed by `next`
    fn new_container(&self, absolute_path: &str, next: &PathSegment) -> Value {
        if next.is_array_selector() {
            return Value::Array(Vec::new());
        }
        let kind = if self.heuristics {
            decide_container(absolute_path, self.schema).kind()
        } else {
            match self.schema.lookup(absolute_path) {
                Some(element) if element.is_repeating() => ContainerKind::Array,
                _ => ContainerKind::Object,
            }
        };
        match kind {
            ContainerKind::Array => Value::Array(Vec::new()),
            ContainerKind::Object => Value::Object(Map::new()),
        }
    }
}

fn split(segments: &[PathSegment]) -> Result<(&PathSegment, &[PathSegment]), PathError> {
    segments.split_first().ok_or(PathError::EmptyPath)
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Whether an existing array element cannot take `next`
///
/// Scalars are replaced, and so is an empty object (a padding slot) in front
/// of an index or predicate. Objects with content are kept.
fn needs_new_element(item: &Value, next: &PathSegment) -> bool {
    match item {
        Value::Array(_) => false,
        Value::Object(map) => next.is_array_selector() && map.is_empty(),
        _ => true,
    }
}

/// Container for an array element followed by `next`
fn element_container(next: &PathSegment) -> Value {
    if next.is_array_selector() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn extend_prefix(prefix: &str, segment: &PathSegment) -> String {
    match segment {
        PathSegment::Property(_) | PathSegment::SlicedProperty { .. } if prefix.is_empty() => {
            segment.to_string()
        }
        PathSegment::Property(_) | PathSegment::SlicedProperty { .. } => format!("{prefix}.{segment}"),
        PathSegment::Index(_) | PathSegment::Predicate { .. } => prefix.to_string(),
    }
}

/// Literal comparison of `item[key]` against a predicate value
fn matches_predicate(item: &Value, key: &str, literal: &str) -> bool {
    match item.get(key) {
        Some(Value::String(found)) => found == literal,
        Some(Value::Number(found)) => found.to_string() == literal,
        Some(Value::Bool(found)) => found.to_string() == literal,
        _ => false,
    }
}

/// Final-segment predicate write: merge objects, replace anything else
fn replace_matched(slot: &mut Value, key: &str, value: Value) {
    match (slot, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            let keep = existing.get(key).cloned();
            existing.extend(incoming);
            if let Some(keep) = keep {
                existing.insert(key.to_string(), keep);
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SchemaElement;
    use serde_json::json;

    fn patient_schema() -> SchemaIndex {
        SchemaIndex::new(
            "Patient",
            vec![
                SchemaElement::new("Patient.identifier", 0, Some("*")),
                SchemaElement::new("Patient.identifier.system", 0, Some("1")),
                SchemaElement::new("Patient.identifier.value", 0, Some("1")),
                SchemaElement::new("Patient.name", 0, Some("*")),
                SchemaElement::new("Patient.name.given", 0, Some("*")),
                SchemaElement::new("Patient.maritalStatus", 0, Some("1")),
                SchemaElement::new("Patient.extension", 0, Some("*")),
                SchemaElement::new("Patient.extension", 0, Some("1")).with_slice("race"),
            ],
        )
    }

    #[test]
    fn test_write_creates_object_chain() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"resourceType": "Patient"});
        writer.write(&mut tree, "maritalStatus.text", json!("single")).unwrap();
        assert_eq!(tree["maritalStatus"], json!({"text": "single"}));
    }

    #[test]
    fn test_write_uses_schema_cardinality() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({});
        writer.write(&mut tree, "name.family", json!("Silva")).unwrap();
        assert_eq!(tree["name"], json!([{"family": "Silva"}]));
    }

    #[test]
    fn test_sliced_segment_extends_prefix() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({});
        writer.write(&mut tree, "extension:race.url", json!("http://race")).unwrap();
        // the race slice is 0..1, so it is an object
        assert_eq!(tree["extension"], json!({"url": "http://race"}));
    }

    #[test]
    fn test_index_padding() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({});
        writer.write(&mut tree, "name[2].family", json!("C")).unwrap();
        assert_eq!(tree["name"], json!([{}, {}, {"family": "C"}]));

        writer.write(&mut tree, "name[0].given[2]", json!("Ana")).unwrap();
        assert_eq!(tree["name"][0]["given"], json!([null, null, "Ana"]));
    }

    #[test]
    fn test_predicate_find_or_create() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({});
        writer
            .write(&mut tree, "identifier[?system='urn:cns'].value", json!("123"))
            .unwrap();
        writer
            .write(&mut tree, "identifier[?system='urn:cns'].use", json!("official"))
            .unwrap();
        writer
            .write(&mut tree, "identifier[?system='urn:cpf'].value", json!("999"))
            .unwrap();

        assert_eq!(
            tree["identifier"],
            json!([
                {"system": "urn:cns", "value": "123", "use": "official"},
                {"system": "urn:cpf", "value": "999"}
            ])
        );
    }

    #[test]
    fn test_predicate_final_segment_merges_objects() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"identifier": [{"system": "a", "value": "1"}]});
        writer
            .write(&mut tree, "identifier[?system='a']", json!({"system": "b", "use": "usual"}))
            .unwrap();
        assert_eq!(tree["identifier"], json!([{"system": "a", "value": "1", "use": "usual"}]));

        writer.write(&mut tree, "identifier[?system='a']", json!("flat")).unwrap();
        assert_eq!(tree["identifier"], json!(["flat"]));
    }

    #[test]
    fn test_broadcast_write() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"name": [{"family": "A"}, "oops", {"family": "B"}]});
        writer.write(&mut tree, "name.use", json!("official")).unwrap();
        assert_eq!(
            tree["name"],
            json!([{"family": "A", "use": "official"}, "oops", {"family": "B", "use": "official"}])
        );
    }

    #[test]
    fn test_broadcast_without_objects_fails() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"name": ["a", "b"]});
        assert!(matches!(
            writer.write(&mut tree, "name.use", json!("x")),
            Err(PathError::NoWritableElement { .. })
        ));
    }

    #[test]
    fn test_structural_errors() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);

        let mut scalar = json!("x");
        assert!(matches!(
            writer.write(&mut scalar, "a", json!(1)),
            Err(PathError::InvalidTarget { .. })
        ));

        let mut tree = json!({"maritalStatus": {"text": "x"}});
        assert_eq!(writer.write(&mut tree, "", json!(1)), Err(PathError::EmptyPath));
        assert!(matches!(
            writer.write(&mut tree, "maritalStatus[0]", json!(1)),
            Err(PathError::IndexOnObject { index: 0, .. })
        ));
        assert!(matches!(
            writer.write(&mut tree, "maritalStatus[?a='b']", json!(1)),
            Err(PathError::PredicateOnObject { .. })
        ));
        // unchanged after failed writes
        assert_eq!(tree, json!({"maritalStatus": {"text": "x"}}));
    }

    #[test]
    fn test_nested_index_writes() {
        let schema = SchemaIndex::empty("Resource");
        let writer = PathWriter::new(&schema);
        let mut tree = json!({});
        writer.write(&mut tree, "grid[1][0]", json!(5)).unwrap();
        assert_eq!(tree, json!({"grid": [{}, [5]]}));
        assert_eq!(crate::path::read(&tree, "grid[1][0]"), Some(&json!(5)));

        let once = tree.clone();
        writer.write(&mut tree, "grid[1][0]", json!(5)).unwrap();
        assert_eq!(tree, once);

        // a padding slot takes the shape the next segment needs
        writer.write(&mut tree, "grid[0][2]", json!(1)).unwrap();
        assert_eq!(tree["grid"][0], json!([null, null, 1]));
    }

    #[test]
    fn test_predicate_after_index() {
        let schema = SchemaIndex::empty("Bundle");
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"entry": []});
        writer.write(&mut tree, "entry[0][?k='v'].x", json!(1)).unwrap();
        assert_eq!(tree, json!({"entry": [[{"k": "v", "x": 1}]]}));
    }

    #[test]
    fn test_failed_write_leaves_tree_unchanged() {
        let schema = SchemaIndex::empty("Resource");
        let writer = PathWriter::new(&schema);

        let mut tree = json!({"grid": [{"a": 1}]});
        writer.write(&mut tree, "grid[2][0]", json!(1)).unwrap();
        assert_eq!(tree, json!({"grid": [{"a": 1}, {}, [1]]}));

        assert!(matches!(
            writer.write(&mut tree, "grid[0][0]", json!(1)),
            Err(PathError::IndexOnObject { index: 0, .. })
        ));
        assert_eq!(tree, json!({"grid": [{"a": 1}, {}, [1]]}));
    }

    #[test]
    fn test_broadcast_failure_is_all_or_nothing() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"name": [{"family": "A"}, {"family": "B", "use": {"text": "x"}}]});
        let before = tree.clone();
        assert!(matches!(
            writer.write(&mut tree, "name.use[0]", json!("official")),
            Err(PathError::IndexOnObject { .. })
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_scalar_intermediate_is_replaced() {
        let schema = patient_schema();
        let writer = PathWriter::new(&schema);
        let mut tree = json!({"maritalStatus": "S"});
        writer.write(&mut tree, "maritalStatus.text", json!("single")).unwrap();
        assert_eq!(tree["maritalStatus"], json!({"text": "single"}));
    }

    #[test]
    fn test_without_heuristics_defaults_to_object() {
        let schema = SchemaIndex::empty("Row");
        let mut tree = json!({});
        PathWriter::without_heuristics(&schema)
            .write(&mut tree, "name.family", json!("Silva"))
            .unwrap();
        assert_eq!(tree, json!({"name": {"family": "Silva"}}));

        let mut tree = json!({});
        PathWriter::new(&schema)
            .write(&mut tree, "name.family", json!("Silva"))
            .unwrap();
        assert_eq!(tree, json!({"name": [{"family": "Silva"}]}));
    }
}
