//! Post-mapping check of mandatory elements
//!
//! An element with `cardinalityMin >= 1` is only required where its parent
//! exists: a repeating group that was never produced does not report its
//! mandatory children. Where the parent repeats, every produced instance
//! must carry the element.

use crate::path::{is_empty_value, strip_slices};
use crate::types::{FieldProcessingError, SchemaElement};
use serde_json::Value;
use std::collections::HashSet;

/// Errors for mandatory elements missing from `output`
pub fn check_mandatory(output: &Value, resource_type: &str, mandatory: &[SchemaElement]) -> Vec<FieldProcessingError> {
    let mut reported = HashSet::new();
    let mut errors = Vec::new();

    for element in mandatory.iter().filter(|e| e.is_mandatory()) {
        let Some(relative) = element.relative_path(resource_type) else {
            continue;
        };
        let base = strip_slices(&relative);
        if reported.contains(&base) {
            continue;
        }

        let names: Vec<&str> = base.split('.').collect();
        let Some((last, parents)) = names.split_last() else {
            continue;
        };
        let instances = collect(output, parents);
        // ancestor group absent
        if instances.is_empty() {
            continue;
        }

        let complete = instances
            .iter()
            .all(|instance| child(instance, last).is_some_and(|value| !is_empty_value(value)));
        if !complete {
            errors.push(FieldProcessingError::missing_mandatory(base.clone(), element.cardinality_min));
            reported.insert(base);
        }
    }

    errors
}

/// Every non-empty object reached by following `names`, arrays flattened
fn collect<'a>(node: &'a Value, names: &[&str]) -> Vec<&'a Value> {
    let mut current = vec![node];
    for name in names {
        let mut next = Vec::new();
        for value in current {
            if let Some(found) = child(value, name) {
                flatten(found, &mut next);
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
        other if !is_empty_value(other) => out.push(other),
        _ => {}
    }
}

/// Property lookup where `name[x]` matches any typed variant
pub(crate) fn child<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    let object = node.as_object()?;
    match name.strip_suffix("[x]") {
        None => object.get(name),
        Some(stem) => object
            .iter()
            .find_map(|(key, value)| is_choice_variant(key, stem).then_some(value)),
    }
}

/// `valueString` is a variant of the `value` stem
pub(crate) fn is_choice_variant(key: &str, stem: &str) -> bool {
    key.strip_prefix(stem)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mandatory() -> Vec<SchemaElement> {
        vec![
            SchemaElement::new("Patient", 1, Some("1")),
            SchemaElement::new("Patient.gender", 1, Some("1")),
            SchemaElement::new("Patient.identifier", 1, Some("1")).with_slice("cns"),
            SchemaElement::new("Patient.identifier:cns.system", 1, Some("1")),
            SchemaElement::new("Patient.identifier.system", 1, Some("1")),
            SchemaElement::new("Patient.contact.relationship", 1, Some("*")),
            SchemaElement::new("Patient.deceased[x]", 1, Some("1")),
            SchemaElement::new("Patient.name", 0, Some("*")),
        ]
    }

    fn paths(errors: &[FieldProcessingError]) -> Vec<&str> {
        errors.iter().map(|e| e.target_path.as_str()).collect()
    }

    #[test]
    fn test_complete_output_passes() {
        let output = json!({
            "resourceType": "Patient",
            "gender": "male",
            "identifier": [{"system": "urn:cns", "value": "1"}],
            "deceasedBoolean": false
        });
        assert!(check_mandatory(&output, "Patient", &mandatory()).is_empty());
    }

    #[test]
    fn test_missing_elements_reported_once() {
        let output = json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:cns"}, {"value": "2"}]
        });
        let errors = check_mandatory(&output, "Patient", &mandatory());
        assert_eq!(paths(&errors), vec!["gender", "identifier.system", "deceased[x]"]);
        assert!(errors.iter().all(|e| e.kind == crate::types::ErrorKind::Validation));
    }

    #[test]
    fn test_absent_parent_group_is_skipped() {
        let output = json!({
            "resourceType": "Patient",
            "gender": "female",
            "identifier": [{"system": "s"}],
            "deceasedDateTime": "2020-01-01",
            "contact": []
        });
        assert!(check_mandatory(&output, "Patient", &mandatory()).is_empty());

        let output = json!({
            "resourceType": "Patient",
            "gender": "female",
            "identifier": [{"system": "s"}],
            "deceasedBoolean": true,
            "contact": [{"name": {"family": "x"}}]
        });
        assert_eq!(paths(&check_mandatory(&output, "Patient", &mandatory())), vec!["contact.relationship"]);
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let output = json!({
            "resourceType": "Patient",
            "gender": "",
            "identifier": [{"system": "s"}],
            "deceasedBoolean": true
        });
        assert_eq!(paths(&check_mandatory(&output, "Patient", &mandatory())), vec!["gender"]);
    }
}
