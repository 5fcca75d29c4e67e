//! Source records to target resources

use super::mandatory::{check_mandatory, child, is_choice_variant};
use super::stage::ItemProcessor;
use super::state::{PipelineState, PipelineTracker};
use crate::path::{base_path, has_value, read, strip_slices, PathWriter};
use crate::registry::{names, FunctionContext, FunctionRegistry};
use crate::schema::{concrete_property_name, parse_typed_value, SchemaIndex};
use crate::types::{FieldMapping, FieldProcessingError, FunctionDetails, MappingConfiguration, SchemaElement, SourceFormat};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Path of the claimed profile inside a produced resource
pub const PROFILE_PATH: &str = "meta.profile[0]";

/// Builds one target resource per source item
pub struct ToTargetProcessor {
    config: MappingConfiguration,
    schema: SchemaIndex,
    registry: Arc<FunctionRegistry>,
    fixed: Vec<SchemaElement>,
    mandatory: Vec<SchemaElement>,
    empty_details: FunctionDetails,
}

impl ToTargetProcessor {
    pub fn new(
        config: MappingConfiguration,
        schema: SchemaIndex,
        registry: Arc<FunctionRegistry>,
        fixed: Vec<SchemaElement>,
        mandatory: Vec<SchemaElement>,
    ) -> Self {
        Self {
            config,
            schema,
            registry,
            fixed,
            mandatory,
            empty_details: FunctionDetails::new(),
        }
    }

    /// Apply every field mapping in declared order
    ///
    /// Returns the output and the index-stripped paths that were written.
    pub fn map_fields(&self, item: &Value, errors: &mut Vec<FieldProcessingError>) -> (Value, HashSet<String>) {
        let writer = PathWriter::new(&self.schema);
        let mut output = json!({ "resourceType": self.config.target_resource_type });
        if let Some(url) = &self.config.schema_url {
            if let Err(error) = claim_profile(&writer, &mut output, url) {
                errors.push(error);
            }
        }

        let mut touched = HashSet::new();
        for mapping in &self.config.field_mappings {
            match self.resolve(item, mapping) {
                Ok(Some(value)) => {
                    if writer.write(&mut output, &mapping.target_path, value).is_ok() {
                        touched.insert(base_path(&mapping.target_path));
                    }
                }
                Ok(None) => {}
                Err(error) => errors.push(error),
            }
        }
        (output, touched)
    }

    /// Value to write for one mapping, `None` when nothing is written
    fn resolve(&self, item: &Value, mapping: &FieldMapping) -> Result<Option<Value>, FieldProcessingError> {
        let ctx = FunctionContext::new(item);
        let mut value = self.source_value(item, mapping);
        let mut defaulted = false;

        let transformation = mapping.transformation_kind.as_deref();
        let transformation_details = mapping.transformation_details.as_ref().unwrap_or(&self.empty_details);

        if value.is_null() && transformation == Some(names::DEFAULT_VALUE) {
            value = self
                .registry
                .transform(names::DEFAULT_VALUE, &value, transformation_details, &ctx)
                .map_err(|message| FieldProcessingError::transformation(mapping, Value::Null, message))?;
            defaulted = true;
        }

        if let Some(kind) = mapping.validation_kind.as_deref() {
            if !value.is_null() || kind == names::REQUIRED {
                let details = mapping.validation_details.as_ref().unwrap_or(&self.empty_details);
                if let Some(message) = self.registry.validate(kind, &value, details, &ctx) {
                    return Err(FieldProcessingError::validation(mapping, value, message));
                }
            }
        }

        if let Some(kind) = transformation.filter(|_| !defaulted) {
            value = self
                .registry
                .transform(kind, &value, transformation_details, &ctx)
                .map_err(|message| FieldProcessingError::transformation(mapping, value.clone(), message))?;
        }

        Ok((defaulted || !value.is_null()).then_some(value))
    }

    /// Source value of a mapping, `Null` when absent
    fn source_value(&self, item: &Value, mapping: &FieldMapping) -> Value {
        if mapping.reads_root() {
            return item.clone();
        }
        let column = match self.config.source_format {
            SourceFormat::Tabular => item.get(&mapping.source_path),
            SourceFormat::JsonLike => None,
        };
        column
            .or_else(|| read(item, &mapping.source_path))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write fixed and default values the mappings left untouched
    pub fn enrich(&self, output: &mut Value, touched: &mut HashSet<String>) {
        let writer = PathWriter::new(&self.schema);
        let resource_type = self.schema.resource_type();

        for element in &self.fixed {
            let Some(relative) = element.relative_path(resource_type) else {
                continue;
            };
            let relative = strip_slices(&relative);
            if touched.contains(&relative) || choice_taken(output, touched, &relative) {
                continue;
            }

            let (stored, declared) = match (&element.fixed_value, &element.default_value) {
                (Some(fixed), _) => (fixed, element.fixed_value_type.as_deref()),
                (None, Some(default)) => (default, element.default_value_type.as_deref()),
                (None, None) => continue,
            };
            let path = match relative.rsplit_once('.') {
                Some((parent, last)) => format!("{parent}.{}", concrete_property_name(last, declared)),
                None => concrete_property_name(&relative, declared),
            };
            if has_value(output, &path) {
                continue;
            }

            if writer.write(output, &path, parse_typed_value(stored, declared)).is_ok() {
                tracing::trace!(%path, "auto-populated");
                touched.insert(relative);
            }
        }
    }

    /// Collect mandatory-element errors into the outcome
    pub fn finish(&self, output: Value, mut errors: Vec<FieldProcessingError>) -> Result<Option<Value>, Vec<FieldProcessingError>> {
        errors.extend(check_mandatory(&output, self.schema.resource_type(), &self.mandatory));
        if errors.is_empty() {
            Ok(Some(output))
        } else {
            Err(errors)
        }
    }
}

/// Write the profile url to `meta.profile[0]`
fn claim_profile(writer: &PathWriter<'_>, output: &mut Value, url: &str) -> Result<(), FieldProcessingError> {
    writer
        .write(output, PROFILE_PATH, Value::String(url.to_string()))
        .map_err(|err| FieldProcessingError::processing(format!("Cannot claim profile '{url}': {err}")))
}

/// Whether another typed variant of a `name[x]` element is already set
fn choice_taken(output: &Value, touched: &HashSet<String>, relative: &str) -> bool {
    let Some(choice) = relative.strip_suffix("[x]") else {
        return false;
    };
    let (parent, stem) = match choice.rsplit_once('.') {
        Some((parent, stem)) => (Some(parent), stem),
        None => (None, choice),
    };

    let written = touched.iter().any(|path| match (path.rsplit_once('.'), parent) {
        (Some((written_parent, key)), Some(parent)) => written_parent == parent && is_choice_variant(key, stem),
        (None, None) => is_choice_variant(path, stem),
        _ => false,
    });
    if written {
        return true;
    }

    let node = match parent {
        Some(parent) => read(output, parent),
        None => Some(output),
    };
    node.and_then(|node| child(node, &format!("{stem}[x]")))
        .is_some_and(|value| !value.is_null())
}

impl ItemProcessor for ToTargetProcessor {
    fn process(&self, item: &Value, tracker: &PipelineTracker) -> Result<Option<Value>, Vec<FieldProcessingError>> {
        tracker.set(PipelineState::Mapping);
        let mut errors = Vec::new();
        let (mut output, mut touched) = self.map_fields(item, &mut errors);

        tracker.set(PipelineState::Enriching);
        self.enrich(&mut output, &mut touched);
        self.finish(output, errors)
    }
}
