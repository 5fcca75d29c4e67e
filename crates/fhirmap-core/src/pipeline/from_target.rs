//! Target resources back to source records

use super::stage::ItemProcessor;
use super::state::{PipelineState, PipelineTracker};
use crate::path::{parse_path, read, PathWriter};
use crate::schema::SchemaIndex;
use crate::types::{FieldProcessingError, MappingConfiguration, SourceFormat};
use serde_json::{Map, Value};

/// Flattens or re-nests each fetched resource into a source-shaped record
pub struct FromTargetProcessor {
    config: MappingConfiguration,
    schema: SchemaIndex,
}

impl FromTargetProcessor {
    pub fn new(config: MappingConfiguration, schema: SchemaIndex) -> Self {
        Self { config, schema }
    }

    fn populate(&self, item: &Value) -> Option<Value> {
        // source side is not schema-governed
        let writer = PathWriter::without_heuristics(&self.schema).with_prefix("");
        let mut output = Value::Object(Map::new());
        let mut populated = false;

        for mapping in &self.config.field_mappings {
            let Some(value) = read(item, &mapping.target_path).filter(|v| !v.is_null()) else {
                continue;
            };
            match self.config.source_format {
                SourceFormat::Tabular => {
                    let Some(column) = parse_path(&mapping.source_path)
                        .first()
                        .and_then(|segment| segment.name().map(str::to_string))
                    else {
                        continue;
                    };
                    if let Value::Object(row) = &mut output {
                        row.insert(column, value.clone());
                        populated = true;
                    }
                }
                SourceFormat::JsonLike => {
                    if writer.write(&mut output, &mapping.source_path, value.clone()).is_ok() {
                        populated = true;
                    }
                }
            }
        }

        populated.then_some(output)
    }
}

impl ItemProcessor for FromTargetProcessor {
    fn process(&self, item: &Value, tracker: &PipelineTracker) -> Result<Option<Value>, Vec<FieldProcessingError>> {
        tracker.set(PipelineState::Mapping);
        let found = item.get("resourceType").cloned().unwrap_or(Value::Null);
        if found.as_str() != Some(self.config.target_resource_type.as_str()) {
            return Err(vec![FieldProcessingError::type_mismatch(&self.config.target_resource_type, found)]);
        }
        Ok(self.populate(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state;
    use crate::types::{Direction, FieldMapping};
    use serde_json::json;

    fn processor(format: SourceFormat) -> FromTargetProcessor {
        FromTargetProcessor::new(
            MappingConfiguration {
                id: "2".to_string(),
                name: "patients-out".to_string(),
                source_format: format,
                target_resource_type: "Patient".to_string(),
                direction: Direction::FromTarget,
                schema_url: None,
                field_mappings: vec![
                    FieldMapping::new("patient.id", "id"),
                    FieldMapping::new("patient.family", "name[0].family"),
                    FieldMapping::new("sex", "gender"),
                ],
            },
            SchemaIndex::empty("Patient"),
        )
    }

    fn run(processor: &FromTargetProcessor, item: Value) -> Result<Option<Value>, Vec<FieldProcessingError>> {
        let (tracker, _handle) = state::channel(0);
        processor.process(&item, &tracker)
    }

    fn patient() -> Value {
        json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Lovelace"}], "gender": "female"})
    }

    #[test]
    fn test_tabular_uses_first_segment() {
        let row = run(&processor(SourceFormat::Tabular), patient()).unwrap().unwrap();
        assert_eq!(row, json!({"patient": "Lovelace", "sex": "female"}));
    }

    #[test]
    fn test_json_like_nests() {
        let record = run(&processor(SourceFormat::JsonLike), patient()).unwrap().unwrap();
        assert_eq!(
            record,
            json!({"patient": {"id": "p1", "family": "Lovelace"}, "sex": "female"})
        );
    }

    #[test]
    fn test_type_mismatch_is_one_error() {
        let errors = run(
            &processor(SourceFormat::Tabular),
            json!({"resourceType": "Observation", "id": "o1"}),
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("expected 'Patient', found 'Observation'"));
    }

    #[test]
    fn test_nothing_populated_emits_nothing() {
        let output = run(&processor(SourceFormat::JsonLike), json!({"resourceType": "Patient"})).unwrap();
        assert!(output.is_none());
    }
}
