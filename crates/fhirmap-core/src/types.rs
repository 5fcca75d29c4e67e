//! Core types and data structures for the fhirmap engine
//!
//! This module defines the mapping configuration model, the schema metadata
//! model, and the records the pipeline emits downstream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque key/value bag attached to validation and transformation functions
pub type FunctionDetails = Map<String, Value>;

/// Source sentinel meaning "the whole source item"
pub const ROOT_SOURCE_PATH: &str = "$ROOT";

/// Shape of the non-resource side of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceFormat {
    /// Flat rows keyed by column name
    Tabular,
    /// Arbitrarily nested JSON objects
    JsonLike,
}

/// Direction of a mapping run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Source records to target resources
    ToTarget,
    /// Target resources to source records
    FromTarget,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToTarget => write!(f, "toTarget"),
            Direction::FromTarget => write!(f, "fromTarget"),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Tabular => write!(f, "tabular"),
            SourceFormat::JsonLike => write!(f, "jsonLike"),
        }
    }
}

/// A declarative mapping between a source shape and a target resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfiguration {
    /// Store identity
    pub id: String,

    /// Unique human-facing name
    pub name: String,

    /// Format of the source side
    pub source_format: SourceFormat,

    /// Resource type produced or consumed, e.g. `Patient`
    pub target_resource_type: String,

    /// Run direction
    pub direction: Direction,

    /// Profile URL the produced resources claim conformance to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_url: Option<String>,

    /// Ordered field mappings
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
}

impl MappingConfiguration {
    /// Whether `identifier` names this configuration by id or by name
    pub fn is_identified_by(&self, identifier: &str) -> bool {
        self.id == identifier || self.name == identifier
    }
}

/// One field-level rule of a mapping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Path on the source side (`$ROOT` for the whole item)
    pub source_path: String,

    /// Path on the target-resource side, regardless of direction
    pub target_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_details: Option<FunctionDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_details: Option<FunctionDetails>,
}

impl FieldMapping {
    /// Create a plain path-to-path mapping
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
            validation_kind: None,
            validation_details: None,
            transformation_kind: None,
            transformation_details: None,
        }
    }

    /// Attach a validation function
    pub fn with_validation(mut self, kind: impl Into<String>, details: Value) -> Self {
        self.validation_kind = Some(kind.into());
        self.validation_details = details.as_object().cloned();
        self
    }

    /// Attach a transformation function
    pub fn with_transformation(mut self, kind: impl Into<String>, details: Value) -> Self {
        self.transformation_kind = Some(kind.into());
        self.transformation_details = details.as_object().cloned();
        self
    }

    /// Whether the mapping reads the whole source item
    pub fn reads_root(&self) -> bool {
        self.source_path == ROOT_SOURCE_PATH
    }
}

/// One element of a target resource's structural definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaElement {
    /// Absolute path, e.g. `Patient.name.given`
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    #[serde(default)]
    pub cardinality_min: u32,

    /// `"1"`, `"*"`, a numeric string, or absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality_max: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value_type: Option<String>,
}

impl SchemaElement {
    /// Create an element with the given cardinality
    pub fn new(path: impl Into<String>, min: u32, max: Option<&str>) -> Self {
        Self {
            path: path.into(),
            slice_name: None,
            cardinality_min: min,
            cardinality_max: max.map(str::to_string),
            fixed_value: None,
            fixed_value_type: None,
            default_value: None,
            default_value_type: None,
        }
    }

    /// Builder-style slice name
    pub fn with_slice(mut self, slice: impl Into<String>) -> Self {
        self.slice_name = Some(slice.into());
        self
    }

    /// Builder-style fixed value
    pub fn with_fixed(mut self, value: impl Into<Value>, value_type: impl Into<String>) -> Self {
        self.fixed_value = Some(value.into());
        self.fixed_value_type = Some(value_type.into());
        self
    }

    /// Builder-style default value
    pub fn with_default(mut self, value: impl Into<Value>, value_type: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self.default_value_type = Some(value_type.into());
        self
    }

    /// Whether the element repeats (`*`, absent, or a bound above one)
    pub fn is_repeating(&self) -> bool {
        match self.cardinality_max.as_deref() {
            None | Some("*") => true,
            Some(max) => max.trim().parse::<u64>().map(|n| n > 1).unwrap_or(false),
        }
    }

    /// Whether the element carries a fixed or default value
    pub fn has_fixed_or_default(&self) -> bool {
        self.fixed_value.is_some() || self.default_value.is_some()
    }

    /// Whether the element is mandatory
    pub fn is_mandatory(&self) -> bool {
        self.cardinality_min >= 1
    }

    /// Path with the slice name appended, as used in element ids
    pub fn sliced_path(&self) -> String {
        match &self.slice_name {
            Some(slice) if !self.path.ends_with(&format!(":{slice}")) => {
                format!("{}:{}", self.path, slice)
            }
            _ => self.path.clone(),
        }
    }

    /// Path relative to the resource type, or `None` for the root element
    pub fn relative_path(&self, resource_type: &str) -> Option<String> {
        let path = self.sliced_path();
        path.strip_prefix(resource_type)
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }
}

/// Category of a per-field failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    Transformation,
    /// Unexpected failure while processing the whole item
    Processing,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Transformation => write!(f, "transformation"),
            ErrorKind::Processing => write!(f, "processing"),
        }
    }
}

/// A failure attached to one field of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProcessingError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    pub target_path: String,
    pub input_value: Value,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl FieldProcessingError {
    /// Validation failure for a mapped field
    pub fn validation(mapping: &FieldMapping, input_value: Value, message: impl Into<String>) -> Self {
        Self {
            source_path: Some(mapping.source_path.clone()),
            target_path: mapping.target_path.clone(),
            input_value,
            kind: ErrorKind::Validation,
            message: message.into(),
            details: mapping.validation_details.clone().map(Value::Object),
        }
    }

    /// Transformation failure for a mapped field
    pub fn transformation(mapping: &FieldMapping, input_value: Value, message: impl Into<String>) -> Self {
        Self {
            source_path: Some(mapping.source_path.clone()),
            target_path: mapping.target_path.clone(),
            input_value,
            kind: ErrorKind::Transformation,
            message: message.into(),
            details: mapping.transformation_details.clone().map(Value::Object),
        }
    }

    /// Missing mandatory element
    pub fn missing_mandatory(target_path: impl Into<String>, min: u32) -> Self {
        let target_path = target_path.into();
        Self {
            source_path: None,
            message: format!(
                "Mandatory element '{target_path}' is missing (minimum cardinality {min})"
            ),
            target_path,
            input_value: Value::Null,
            kind: ErrorKind::Validation,
            details: None,
        }
    }

    /// Item of the wrong resource type for a FromTarget run
    pub fn type_mismatch(expected: &str, found: Value) -> Self {
        let shown = match &found {
            Value::String(s) => s.clone(),
            Value::Null => "none".to_string(),
            other => other.to_string(),
        };
        Self {
            source_path: None,
            target_path: "resourceType".to_string(),
            message: format!("Resource type mismatch: expected '{expected}', found '{shown}'"),
            input_value: found,
            kind: ErrorKind::Validation,
            details: None,
        }
    }

    /// Unexpected failure while processing a whole item
    pub fn processing(message: impl Into<String>) -> Self {
        Self {
            source_path: None,
            target_path: String::new(),
            input_value: Value::Null,
            kind: ErrorKind::Processing,
            message: message.into(),
            details: None,
        }
    }
}

/// What the pipeline emits downstream for each input item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamRecord {
    /// A successfully produced item
    Data { item: Value },
    /// The original item and every error collected while processing it
    #[serde(rename_all = "camelCase")]
    Error {
        original_item: Value,
        errors: Vec<FieldProcessingError>,
    },
}

impl StreamRecord {
    pub fn data(item: Value) -> Self {
        StreamRecord::Data { item }
    }

    pub fn error(original_item: Value, errors: Vec<FieldProcessingError>) -> Self {
        StreamRecord::Error {
            original_item,
            errors,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, StreamRecord::Data { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamRecord::Error { .. })
    }

    /// The produced item, if this is a data record
    pub fn item(&self) -> Option<&Value> {
        match self {
            StreamRecord::Data { item } => Some(item),
            StreamRecord::Error { .. } => None,
        }
    }

    /// The collected errors, empty for data records
    pub fn errors(&self) -> &[FieldProcessingError] {
        match self {
            StreamRecord::Data { .. } => &[],
            StreamRecord::Error { errors, .. } => errors,
        }
    }

    /// Serialize as one newline-terminated JSON line
    pub fn to_ndjson(&self) -> crate::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_configuration_deserializes_camel_case() {
        let config: MappingConfiguration = serde_json::from_value(json!({
            "id": "42",
            "name": "patients-csv",
            "sourceFormat": "tabular",
            "targetResourceType": "Patient",
            "direction": "toTarget",
            "fieldMappings": [
                {
                    "sourcePath": "birthDate_raw",
                    "targetPath": "birthDate",
                    "transformationKind": "FORMAT_DATE",
                    "transformationDetails": {"inputFormat": "dd/MM/yyyy", "outputFormat": "yyyy-MM-dd"}
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.source_format, SourceFormat::Tabular);
        assert_eq!(config.direction, Direction::ToTarget);
        assert!(config.schema_url.is_none());
        assert_eq!(config.field_mappings[0].transformation_kind.as_deref(), Some("FORMAT_DATE"));
        assert!(config.is_identified_by("42"));
        assert!(config.is_identified_by("patients-csv"));
    }

    #[test]
    fn test_schema_element_repeating() {
        assert!(SchemaElement::new("Patient.name", 0, Some("*")).is_repeating());
        assert!(SchemaElement::new("Patient.name", 0, None).is_repeating());
        assert!(SchemaElement::new("Patient.name", 0, Some("3")).is_repeating());
        assert!(!SchemaElement::new("Patient.gender", 0, Some("1")).is_repeating());
        assert!(!SchemaElement::new("Patient.gender", 0, Some("0")).is_repeating());
        assert!(!SchemaElement::new("Patient.gender", 0, Some("many")).is_repeating());
    }

    #[test]
    fn test_schema_element_relative_path() {
        let element = SchemaElement::new("Patient.identifier", 1, Some("1")).with_slice("cns");
        assert_eq!(element.sliced_path(), "Patient.identifier:cns");
        assert_eq!(element.relative_path("Patient").as_deref(), Some("identifier:cns"));
        assert_eq!(SchemaElement::new("Patient", 0, Some("*")).relative_path("Patient"), None);
        assert_eq!(SchemaElement::new("Observation.code", 1, Some("1")).relative_path("Patient"), None);
    }

    #[test]
    fn test_stream_record_serialization() {
        let record = StreamRecord::data(json!({"resourceType": "Patient"}));
        let line = record.to_ndjson().unwrap();
        assert_eq!(line, "{\"type\":\"data\",\"item\":{\"resourceType\":\"Patient\"}}\n");

        let record = StreamRecord::error(json!({"a": 1}), vec![FieldProcessingError::processing("boom")]);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["originalItem"]["a"], 1);
        assert_eq!(value["errors"][0]["kind"], "processing");
        assert!(record.is_error());
        assert_eq!(record.errors().len(), 1);
    }
}
