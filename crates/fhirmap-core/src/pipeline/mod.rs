//! Streaming, direction-aware transform pipeline
//!
//! A pipeline is created per mapping configuration. Setup resolves the
//! configuration, its schema metadata and the mapping check before a single
//! item is read, so configuration problems surface as `Err` from
//! [`PipelineFactory::create_pipeline`]. Once running, items flow through a
//! bounded channel:
//!
//! ```text
//! source (csv / json / remote pages) -> stage driver -> mpsc(capacity) -> caller
//! ```
//!
//! The caller receives `Result<StreamRecord>` items. Item failures are
//! `Ok(StreamRecord::Error)`; a source failure is a final `Err`.
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

pub mod from_target;
pub mod mandatory;
pub mod source;
pub mod stage;
pub mod state;
pub mod to_target;

pub use from_target::FromTargetProcessor;
pub use mandatory::check_mandatory;
pub use source::{items, json_items, tabular_items, ItemIter};
pub use stage::ItemProcessor;
pub use state::{PipelineHandle, PipelineState, PipelineStats, PipelineTracker};
pub use to_target::ToTargetProcessor;

use crate::config::PipelineConfig;
use crate::delivery::DeliverySink;
use crate::mapping::check_mapping;
use crate::provider::{ConfigProvider, SchemaFilter, SchemaQuery};
use crate::registry::FunctionRegistry;
use crate::remote::{paginate, RemoteRecordSource};
use crate::schema::SchemaIndex;
use crate::types::{Direction, MappingConfiguration, StreamRecord};
use crate::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use stage::StageDriver;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Content type of serialized pipeline output
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Records of one run; an `Err` item is terminal
pub type RecordStream = BoxStream<'static, Result<StreamRecord>>;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Direction-specific input of a run
pub enum PipelineInput {
    /// Raw tabular or JSON bytes, parsed per the configuration's source format
    Source(Box<dyn Read + Send>),
    /// Already-parsed source items
    Items(ItemIter),
    /// Paginated query against a remote record source (FromTarget)
    Remote {
        source: Arc<dyn RemoteRecordSource>,
        query: String,
        /// Resources buffered ahead of the pipeline
        buffer: usize,
    },
}

impl PipelineInput {
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        PipelineInput::Source(Box::new(reader))
    }

    pub fn items(items: Vec<serde_json::Value>) -> Self {
        PipelineInput::Items(Box::new(items.into_iter().map(Ok)))
    }

    pub fn remote(source: Arc<dyn RemoteRecordSource>, query: impl Into<String>, buffer: usize) -> Self {
        PipelineInput::Remote {
            source,
            query: query.into(),
            buffer,
        }
    }

    fn direction(&self) -> Direction {
        match self {
            PipelineInput::Source(_) | PipelineInput::Items(_) => Direction::ToTarget,
            PipelineInput::Remote { .. } => Direction::FromTarget,
        }
    }
}

/// How the caller should label the serialized output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub content_type: &'static str,
    pub direction: Direction,
    /// Suggested download name
    pub file_name: String,
}

/// A running pipeline
pub struct PipelineOutput {
    pub stream: RecordStream,
    pub descriptor: OutputDescriptor,
    pub handle: PipelineHandle,
    /// Non-blocking mapping diagnostics found during setup
    pub warnings: Vec<String>,
}

/// Serialize each record as one NDJSON line
pub fn ndjson_lines(records: RecordStream) -> BoxStream<'static, Result<String>> {
    records.map(|record| record.and_then(|r| r.to_ndjson())).boxed()
}

/// Creates pipelines over a configuration provider and function registry
#[derive(Clone)]
pub struct PipelineFactory {
    provider: Arc<dyn ConfigProvider>,
    registry: Arc<FunctionRegistry>,
    config: PipelineConfig,
    sink: Option<Arc<dyn DeliverySink>>,
}

impl PipelineFactory {
    pub fn new(provider: Arc<dyn ConfigProvider>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            provider,
            registry,
            config: PipelineConfig::default(),
            sink: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver every produced resource of ToTarget runs
    pub fn with_delivery_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve a configuration and its schema and check the mapping
    ///
    /// Nothing is streamed; this is the setup half of [`Self::create_pipeline`].
    pub async fn prepare(&self, identifier: &str) -> Result<PreparedPipeline> {
        let config = self
            .provider
            .mapping_config(identifier)
            .await?
            .ok_or_else(|| Error::ConfigNotFound {
                identifier: identifier.to_string(),
            })?;

        let query = SchemaQuery::for_config(&config);
        let elements = self.provider.schema_elements(&query, SchemaFilter::All).await?;
        if config.direction == Direction::ToTarget && elements.is_empty() {
            return Err(Error::SchemaNotProcessed {
                resource_type: Some(query.resource_type.clone()),
                url: query.url.clone(),
            });
        }
        let schema = SchemaIndex::new(config.target_resource_type.clone(), elements);
        let warnings = check_mapping(&config, &schema, &self.registry).into_result(&config.name)?;

        Ok(PreparedPipeline {
            config,
            query,
            schema,
            warnings,
        })
    }

    /// Set up a run and start streaming
    pub async fn create_pipeline(&self, identifier: &str, input: PipelineInput) -> Result<PipelineOutput> {
        let prepared = self.prepare(identifier).await?;
        let PreparedPipeline {
            config,
            query,
            schema,
            warnings,
        } = prepared;

        if input.direction() != config.direction {
            return Err(Error::invalid_input(format!(
                "Mapping '{}' runs {} but was given {} input",
                config.name,
                config.direction,
                input.direction()
            )));
        }

        let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!(
            "pipeline",
            config = %config.name,
            direction = %config.direction,
            run_id
        );
        let descriptor = OutputDescriptor {
            content_type: NDJSON_CONTENT_TYPE,
            direction: config.direction,
            file_name: format!("{}-{}.ndjson", config.name, config.direction),
        };
        let (tracker, handle) = state::channel(run_id);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        match input {
            PipelineInput::Remote {
                source: remote,
                query: search,
                buffer,
            } => {
                let resources = paginate(remote, search, buffer);
                StageDriver {
                    processor: Arc::new(FromTargetProcessor::new(config, schema)),
                    tracker,
                    sink: None,
                }
                .spawn_async(resources, tx, span);
            }
            input => {
                let items = match input {
                    PipelineInput::Source(reader) => source::items(config.source_format, reader)?,
                    PipelineInput::Items(items) => items,
                    PipelineInput::Remote { .. } => return Err(Error::invalid_input("Remote input needs a fromTarget mapping")),
                };
                let fixed = self.provider.schema_elements(&query, SchemaFilter::FixedOrDefault).await?;
                let mandatory = self.provider.schema_elements(&query, SchemaFilter::Mandatory).await?;
                let processor = ToTargetProcessor::new(config, schema, Arc::clone(&self.registry), fixed, mandatory);
                StageDriver {
                    processor: Arc::new(processor),
                    tracker,
                    sink: self.sink.clone(),
                }
                .spawn_blocking(items, tx, span);
            }
        }

        tracing::debug!(run_id, "pipeline started");
        Ok(PipelineOutput {
            stream: receiver_stream(rx),
            descriptor,
            handle,
            warnings,
        })
    }
}

/// Setup result of a run
#[derive(Debug, Clone)]
pub struct PreparedPipeline {
    pub config: MappingConfiguration,
    pub query: SchemaQuery,
    pub schema: SchemaIndex,
    pub warnings: Vec<String>,
}

fn receiver_stream(rx: mpsc::Receiver<Result<StreamRecord>>) -> RecordStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
