//! fhirmap Core - Mapping engine between source records and clinical resources
//!
//! This crate converts tabular or JSON source records into target resources
//! (and target resources back into source records), driven by declarative
//! per-field mapping configurations and by schema metadata that describes
//! each element's cardinality and fixed/default value.
//!
//! # Main Components
//!
//! - **Path algebra** ([`path`]): parse, read and write nested, indexed,
//!   sliced and predicate-filtered locations inside a JSON tree
//! - **Function registry** ([`registry`]): named validation and
//!   transformation functions
//! - **Metadata cache** ([`cache`], [`provider`]): cache-aside lookups of
//!   configurations and schema elements with explicit invalidation
//! - **Transform pipeline** ([`pipeline`]): bounded, per-item isolated
//!   streaming in both directions
//! - **Adapters** ([`remote`], [`delivery`]): paginated HTTP record source and
//!   HTTP delivery sink
//!
//! # Example
//!
//! ```no_run
//! use fhirmap_core::{FunctionRegistry, InMemoryConfigProvider, PipelineFactory, PipelineInput};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> fhirmap_core::Result<()> {
//! let store = Arc::new(InMemoryConfigProvider::new());
//! let factory = PipelineFactory::new(store, Arc::new(FunctionRegistry::with_builtins()));
//!
//! let csv = std::io::Cursor::new("birthDate_raw\n15/01/2023\n");
//! let mut output = factory.create_pipeline("patients-csv", PipelineInput::reader(csv)).await?;
//! while let Some(record) = output.stream.next().await {
//!     print!("{}", record?.to_ndjson()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod delivery;
pub mod error;
pub mod mapping;
pub mod path;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod remote;
pub mod schema;
pub mod types;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use types::{
    Direction, ErrorKind, FieldMapping, FieldProcessingError, FunctionDetails, MappingConfiguration, SchemaElement,
    SourceFormat, StreamRecord, ROOT_SOURCE_PATH,
};

pub use cache::{CacheService, CacheStats, InMemoryCache, MetadataCache};
pub use config::{CacheConfig, DeliveryConfig, PipelineConfig, RemoteSourceConfig};
pub use delivery::{DeliveryReceipt, DeliverySink, HttpDeliverySink};
pub use mapping::{check_mapping, MappingReport};
pub use path::{PathError, PathSegment, PathWriter};
pub use pipeline::{
    ndjson_lines, OutputDescriptor, PipelineFactory, PipelineHandle, PipelineInput, PipelineOutput, PipelineState,
    PipelineStats, RecordStream,
};
pub use provider::{
    CachedConfigProvider, ConfigProvider, InMemoryConfigProvider, MutationListener, SchemaDocument, SchemaFilter,
    SchemaQuery, StoreDocument,
};
pub use registry::{FunctionContext, FunctionRegistry};
pub use remote::{HttpRecordSource, Page, RemoteRecordSource, RetryPolicy};
pub use schema::SchemaIndex;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
