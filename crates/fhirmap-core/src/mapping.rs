//! Configuration-time checks for mapping configurations
//!
//! Every target path must resolve against the schema and every function
//! kind must be registered before a pipeline starts streaming. Sliced
//! paths fall back to their unsliced form (`identifier:cns.value` is
//! accepted when `identifier.value` is known), and paths that descend into
//! an element the schema does not expand (datatype internals such as
//! `name.family` under a bare `name`) are accepted as well.

use crate::path::{decide_container, parse_path, strip_indices, PathSegment};
use crate::registry::FunctionRegistry;
use crate::schema::SchemaIndex;
use crate::types::{FieldMapping, MappingConfiguration};
use crate::{Error, Result};

/// Outcome of checking one configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingReport {
    /// Blocking problems
    pub problems: Vec<String>,
    /// Non-blocking authoring diagnostics
    pub warnings: Vec<String>,
}

impl MappingReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }

    /// `Err(InvalidMapping)` when any problem was found
    pub fn into_result(self, config_name: &str) -> Result<Vec<String>> {
        if self.problems.is_empty() {
            Ok(self.warnings)
        } else {
            Err(Error::InvalidMapping {
                config: config_name.to_string(),
                problems: self.problems,
            })
        }
    }
}

/// Check all field mappings of `config`
///
/// Target paths are only checked against a non-empty schema.
pub fn check_mapping(
    config: &MappingConfiguration,
    schema: &SchemaIndex,
    registry: &FunctionRegistry,
) -> MappingReport {
    let mut report = MappingReport::default();

    for (position, mapping) in config.field_mappings.iter().enumerate() {
        let label = format!("mapping #{} ({} -> {})", position + 1, mapping.source_path, mapping.target_path);

        if mapping.source_path.trim().is_empty() {
            report.problems.push(format!("{label}: source path is empty"));
        }
        if parse_path(&mapping.target_path).is_empty() {
            report.problems.push(format!("{label}: target path is empty"));
            continue;
        }

        check_functions(mapping, registry, &label, &mut report);

        if !schema.is_empty() {
            if !is_known_target(&mapping.target_path, schema) {
                report.problems.push(format!(
                    "{label}: target path '{}' is not defined for {}",
                    mapping.target_path,
                    schema.resource_type()
                ));
            } else if let Some(at) = broadcast_point(&mapping.target_path, schema) {
                tracing::warn!(
                    config = %config.name,
                    target = %mapping.target_path,
                    repeating = %at,
                    "target path writes into every element of a repeating parent"
                );
                report.warnings.push(format!(
                    "{label}: '{at}' repeats and has no index or predicate, writes apply to every element"
                ));
            }
        }
    }

    report
}

fn check_functions(mapping: &FieldMapping, registry: &FunctionRegistry, label: &str, report: &mut MappingReport) {
    if let Some(kind) = &mapping.validation_kind {
        if !registry.has_validation(kind) {
            report.problems.push(format!("{label}: unknown validation function '{kind}'"));
        }
    }
    if let Some(kind) = &mapping.transformation_kind {
        if !registry.has_transformation(kind) {
            report.problems.push(format!("{label}: unknown transformation function '{kind}'"));
        }
    }
}

/// Whether a relative target path resolves against the schema
pub fn is_known_target(target_path: &str, schema: &SchemaIndex) -> bool {
    let candidates = candidate_paths(target_path, schema.resource_type());
    if candidates.iter().any(|candidate| schema.contains(candidate)) {
        return true;
    }
    candidates.iter().any(|candidate| below_leaf_element(candidate, schema))
}

/// Absolute candidates: as written, then slices removed right to left
fn candidate_paths(target_path: &str, resource_type: &str) -> Vec<String> {
    let relative = strip_indices(target_path);
    let mut parts: Vec<String> = std::iter::once(resource_type.to_string())
        .chain(relative.split('.').map(str::to_string))
        .collect();

    let mut candidates = vec![parts.join(".")];
    for position in (0..parts.len()).rev() {
        if let Some((name, _)) = parts[position].split_once(':') {
            parts[position] = name.to_string();
            candidates.push(parts.join("."));
        }
    }
    candidates
}

/// The deepest known ancestor exists and declares no children
fn below_leaf_element(candidate: &str, schema: &SchemaIndex) -> bool {
    let mut cursor = candidate;
    while let Some((parent, _)) = cursor.rsplit_once('.') {
        if schema.contains(parent) {
            return !schema.has_children(parent);
        }
        cursor = parent;
    }
    false
}

/// First repeating element a bare property is written through, if any
fn broadcast_point(target_path: &str, schema: &SchemaIndex) -> Option<String> {
    let segments = parse_path(target_path);
    let mut prefix = schema.resource_type().to_string();

    for (position, segment) in segments.iter().enumerate() {
        if segment.is_array_selector() {
            continue;
        }
        prefix = format!("{prefix}.{segment}");
        let next = segments.get(position + 1);
        let is_last = next.is_none();
        let selected = next.is_some_and(PathSegment::is_array_selector);
        if !is_last && !selected && decide_container(&prefix, schema).is_array() {
            return Some(prefix);
        }
    }
    None
}
