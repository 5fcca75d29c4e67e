//! End-to-end tests for the transform pipeline
//!
//! These tests drive pipelines through the public factory with in-memory
//! stores, CSV/JSON input and in-memory remote sources.


use async_trait::async_trait;
use fhirmap_core::{
    ndjson_lines, CachedConfigProvider, DeliveryReceipt, DeliverySink, Direction, Error, ErrorKind, FieldMapping,
    FunctionRegistry, InMemoryCache, MetadataCache, PipelineConfig, PipelineFactory, PipelineInput, PipelineState,
    SourceFormat, StreamRecord,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_support::*;

const CSV: &str = "\
cns,sex,birthDate_raw,first,last
700000001,M,15/01/2023,Ada,Lovelace
700000002,F,02/03/1990,Grace,Hopper
abc,X,01/01/2000,Bad,Row
700000004,,31/12/1985,Alan,Turing
700000005,F,,Edith,Clarke
";

#[tokio::test]
async fn test_csv_to_target_end_to_end() {
    let factory = factory(store());
    let output = factory
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
        .await
        .unwrap();

    assert_eq!(output.descriptor.content_type, "application/x-ndjson");
    assert_eq!(output.descriptor.direction, Direction::ToTarget);
    assert_eq!(output.descriptor.file_name, "patients-csv-toTarget.ndjson");

    let handle = output.handle.clone();
    let records = records(output.stream).await;
    assert_eq!(records.len(), 5);

    let first = records[0].item().unwrap();
    assert_eq!(
        first,
        &json!({
            "resourceType": "Patient",
            "meta": {"profile": [PROFILE_URL]},
            "identifier": [{"system": "urn:cns", "value": "700000001"}],
            "gender": "male",
            "birthDate": "2023-01-15",
            "name": [{"text": "Ada Lovelace"}],
            "active": true
        })
    );

    // the unknown code falls back to the lookup default
    assert_eq!(records[3].item().unwrap()["gender"], "unknown");
    assert!(records[4].item().unwrap().get("birthDate").is_none());

    assert_eq!(handle.finished().await, PipelineState::Done);
    let stats = handle.stats();
    assert_eq!(stats.items_read, 5);
    assert_eq!(stats.data_records, 4);
    assert_eq!(stats.error_records, 1);
}

#[tokio::test]
async fn test_item_isolation_keeps_order() {
    let output = factory(store())
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
        .await
        .unwrap();
    let records = records(output.stream).await;

    let kinds: Vec<bool> = records.iter().map(StreamRecord::is_data).collect();
    assert_eq!(kinds, vec![true, true, false, true, true]);

    match &records[2] {
        StreamRecord::Error { original_item, errors } => {
            assert_eq!(original_item["cns"], "abc");
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].kind, ErrorKind::Validation);
            assert_eq!(errors[0].source_path.as_deref(), Some("cns"));
        }
        other => panic!("expected an error record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_panicking_function_becomes_processing_error() {
    let store = store();
    store
        .upsert_config(config(
            "explosive",
            SourceFormat::JsonLike,
            Direction::ToTarget,
            vec![
                FieldMapping::new("sex", "gender"),
                FieldMapping::new("code", "birthDate").with_transformation("EXPLODE", json!({})),
            ],
        ))
        .await
        .unwrap();
    let registry = FunctionRegistry::with_builtins().register_transformation("EXPLODE", |value, _, _| {
        if value == "boom" {
            panic!("kaboom");
        }
        Ok(value.clone())
    });
    let factory = PipelineFactory::new(store, Arc::new(registry));

    let items = vec![
        json!({"sex": "male", "code": "2000-01-01"}),
        json!({"sex": "male", "code": "boom"}),
        json!({"sex": "female", "code": "2001-01-01"}),
    ];
    let output = factory.create_pipeline("explosive", PipelineInput::items(items)).await.unwrap();
    let records = records(output.stream).await;

    assert_eq!(records.len(), 3);
    assert!(records[0].is_data());
    assert!(records[2].is_data());
    let errors = records[1].errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Processing);
    assert!(errors[0].message.contains("kaboom"));
}

#[tokio::test]
async fn test_predicate_writes_share_one_entry() {
    let store = store();
    store
        .upsert_config(config(
            "cns-use",
            SourceFormat::JsonLike,
            Direction::ToTarget,
            vec![
                FieldMapping::new("sex", "gender"),
                FieldMapping::new("cns", "identifier[?system='urn:cns'].value"),
                FieldMapping::new("use", "identifier[?system='urn:cns'].use"),
                FieldMapping::new("mrn", "identifier[?system='urn:mrn'].value"),
            ],
        ))
        .await
        .unwrap();

    let output = factory(store)
        .create_pipeline(
            "cns-use",
            PipelineInput::items(vec![json!({"sex": "male", "cns": "123", "use": "official", "mrn": "9"})]),
        )
        .await
        .unwrap();
    let records = records(output.stream).await;

    assert_eq!(
        records[0].item().unwrap()["identifier"],
        json!([
            {"system": "urn:cns", "value": "123", "use": "official"},
            {"system": "urn:mrn", "value": "9"}
        ])
    );
}

#[tokio::test]
async fn test_mandatory_check_skips_absent_groups() {
    let store = store();
    store
        .upsert_config(config(
            "contacts",
            SourceFormat::JsonLike,
            Direction::ToTarget,
            vec![
                FieldMapping::new("sex", "gender"),
                FieldMapping::new("phone", "contact[0].telecom[0].value"),
            ],
        ))
        .await
        .unwrap();

    let output = factory(store)
        .create_pipeline(
            "contacts",
            PipelineInput::items(vec![json!({"sex": "male"}), json!({"sex": "male", "phone": "555"})]),
        )
        .await
        .unwrap();
    let records = records(output.stream).await;

    assert!(records[0].is_data(), "no contact, no contact errors");
    let errors = records[1].errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].target_path, "contact.relationship");
}

#[tokio::test]
async fn test_from_target_mismatch_and_empty_items() {
    let source = Arc::new(StaticPages::new(vec![
        vec![patient("p1", "female"), json!({"resourceType": "Observation", "id": "o1"})],
        vec![json!({"resourceType": "Patient"}), patient("p2", "male")],
    ]));
    let output = factory(store())
        .create_pipeline("patients-out", PipelineInput::remote(source, "Patient", 8))
        .await
        .unwrap();
    assert_eq!(output.descriptor.direction, Direction::FromTarget);

    let records = records(output.stream).await;
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].item().unwrap(),
        &json!({"patient_id": "p1", "sex": "female", "born": "1990-02-03"})
    );
    assert!(records[1].is_error());
    assert_eq!(records[1].errors().len(), 1);
    assert!(records[1].errors()[0].message.contains("Observation"));
    assert_eq!(records[2].item().unwrap()["patient_id"], "p2");
}

#[tokio::test]
async fn test_remote_failure_is_terminal() {
    let source = Arc::new(StaticPages::new(vec![vec![patient("p1", "female")], vec![patient("p2", "male")]]).failing_at(1));
    let output = factory(store())
        .create_pipeline("patients-out", PipelineInput::remote(source, "Patient", 8))
        .await
        .unwrap();
    let handle = output.handle.clone();
    let items = collect(output.stream).await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(
        items[1],
        Err(Error::RemoteSource { status: Some(500), .. })
    ));
    assert_eq!(handle.finished().await, PipelineState::Error);
}

#[tokio::test]
async fn test_malformed_row_is_terminal() {
    let csv = "cns,sex\n700000001,M\n700000002\n700000003,F\n";
    let output = factory(store())
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(csv)))
        .await
        .unwrap();
    let items = collect(output.stream).await;

    assert_eq!(items.len(), 2);
    assert!(items[0].as_ref().unwrap().is_data());
    assert!(matches!(items[1], Err(Error::InvalidInputData { .. })));
}

#[tokio::test]
async fn test_slow_consumer_stops_pulling() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let factory = factory(store()).with_config(PipelineConfig::default().with_channel_capacity(1));
    let input = PipelineInput::Items(Box::new(CountingItems {
        pulled: Arc::clone(&pulled),
        remaining: 1_000,
    }));

    let mut output = factory.create_pipeline("patients-csv", input).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pulled.load(Ordering::SeqCst) <= 3, "pulled {}", pulled.load(Ordering::SeqCst));

    for _ in 0..5 {
        assert!(output.stream.next().await.unwrap().is_ok());
    }
    drop(output.stream);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_drop = pulled.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(after_drop <= 8, "pulled {after_drop}");
    assert_eq!(pulled.load(Ordering::SeqCst), after_drop);
    assert_eq!(output.handle.finished().await, PipelineState::Done);
}

#[tokio::test]
async fn test_dropping_output_stops_remote_fetch() {
    let pages: Vec<Vec<Value>> = (0..50)
        .map(|page| (0..4).map(|i| patient(&format!("{page}-{i}"), "male")).collect())
        .collect();
    let source = Arc::new(StaticPages::new(pages));
    let factory = factory(store()).with_config(PipelineConfig::default().with_channel_capacity(1));

    let mut output = factory
        .create_pipeline("patients-out", PipelineInput::remote(source.clone(), "Patient", 2))
        .await
        .unwrap();
    assert!(output.stream.next().await.unwrap().is_ok());
    drop(output.stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let fetched = source.fetched.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(fetched < 5, "fetched {fetched} pages");
    assert_eq!(source.fetched.load(Ordering::SeqCst), fetched);
}

#[tokio::test]
async fn test_setup_errors() {
    let store = store();
    store
        .upsert_config(config(
            "broken",
            SourceFormat::Tabular,
            Direction::ToTarget,
            vec![FieldMapping::new("x", "notAnElement"), FieldMapping::new("y", "gender").with_validation("NOPE", json!({}))],
        ))
        .await
        .unwrap();
    let mut observation = config("observations", SourceFormat::Tabular, Direction::ToTarget, vec![]);
    observation.target_resource_type = "Observation".to_string();
    observation.schema_url = None;
    store.upsert_config(observation).await.unwrap();

    let factory = factory(store);
    let input = || PipelineInput::reader(Cursor::new("a\n1\n"));

    let err = factory.create_pipeline("missing", input()).await.err().unwrap();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
    assert_eq!(err.status_hint(), 404);

    let err = factory.create_pipeline("observations", input()).await.err().unwrap();
    assert!(matches!(err, Error::SchemaNotProcessed { .. }));

    let err = factory.create_pipeline("broken", input()).await.err().unwrap();
    match err {
        Error::InvalidMapping { problems, .. } => {
            assert_eq!(problems.len(), 2);
        }
        other => panic!("expected InvalidMapping, got {other:?}"),
    }

    let source = Arc::new(StaticPages::new(vec![]));
    let err = factory
        .create_pipeline("patients-csv", PipelineInput::remote(source, "Patient", 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidInputData { .. }));

    let err = factory.create_pipeline("patients-out", input()).await.err().unwrap();
    assert!(matches!(err, Error::InvalidInputData { .. }));
}

#[tokio::test]
async fn test_ndjson_lines() {
    let output = factory(store())
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
        .await
        .unwrap();
    let lines: Vec<String> = ndjson_lines(output.stream)
        .map(|line| line.unwrap())
        .collect()
        .await;

    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|line| line.ends_with('\n')));
    let third: Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(third["type"], "error");
    assert_eq!(third["errors"][0]["kind"], "validation");
}

struct Recording(Mutex<Vec<Value>>);

#[async_trait]
impl DeliverySink for Recording {
    async fn deliver(&self, resource: &Value) -> fhirmap_core::Result<DeliveryReceipt> {
        self.0.lock().unwrap().push(resource.clone());
        Ok(DeliveryReceipt {
            status: 201,
            resource_type: "Patient".to_string(),
            id: None,
            location: None,
        })
    }
}

#[tokio::test]
async fn test_produced_resources_are_delivered() {
    let sink = Arc::new(Recording(Mutex::new(Vec::new())));
    let factory = factory(store()).with_delivery_sink(sink.clone());
    let output = factory
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
        .await
        .unwrap();
    let records = records(output.stream).await;
    assert_eq!(records.len(), 5);

    for _ in 0..100 {
        if sink.0.lock().unwrap().len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(sink.0.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_cached_provider_serves_repeated_runs() {
    let store = store();
    let cached = Arc::new(CachedConfigProvider::new(
        store.clone(),
        MetadataCache::new(Arc::new(InMemoryCache::new())),
    ));
    store.add_listener(cached.clone());
    let factory = PipelineFactory::new(cached, Arc::new(FunctionRegistry::with_builtins()));

    for _ in 0..3 {
        let output = factory
            .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
            .await
            .unwrap();
        assert_eq!(records(output.stream).await.len(), 5);
    }
    assert_eq!(store.config_reads(), 1);
    assert_eq!(store.schema_reads(), 3);

    // a mutation reaches the next run
    let mut updated = patients_csv();
    updated.field_mappings.truncate(2);
    store.upsert_config(updated).await.unwrap();

    let output = factory
        .create_pipeline("patients-csv", PipelineInput::reader(Cursor::new(CSV)))
        .await
        .unwrap();
    let records = records(output.stream).await;
    assert!(records[0].item().unwrap().get("birthDate").is_none());
    assert_eq!(store.config_reads(), 2);
}
