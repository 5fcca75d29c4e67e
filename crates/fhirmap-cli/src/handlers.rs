//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand
//! and the wiring they share: store loading, the cached provider and record
//! draining.

mod check;
mod extract;
mod path;
mod transform;

pub use check::handle_check;
pub use extract::handle_extract;
pub use path::handle_path;
pub use transform::handle_transform;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{RecordWriter, RunSummary};
use fhirmap_core::{
    ndjson_lines, CachedConfigProvider, ConfigProvider, FunctionRegistry, InMemoryCache, InMemoryConfigProvider,
    MetadataCache, PipelineFactory, PipelineOutput, PipelineStats,
};
use futures::StreamExt;
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Store-backed pipeline factory
pub(crate) struct Engine {
    pub store: Arc<InMemoryConfigProvider>,
    pub factory: PipelineFactory,
}

/// Load the store file and wire the provider, cache and registry
pub(crate) fn engine(config: &Config, cli_store: Option<&Path>) -> Result<Engine> {
    let document = config.load_store(cli_store)?;
    tracing::info!(
        mappings = document.mappings.len(),
        schemas = document.schemas.len(),
        "store loaded"
    );
    let store = Arc::new(InMemoryConfigProvider::from_document(document));

    let provider: Arc<dyn ConfigProvider> = if config.cache.enabled {
        let cache = MetadataCache::new(Arc::new(InMemoryCache::with_config(config.cache.clone())));
        let cached = Arc::new(CachedConfigProvider::new(store.clone(), cache).with_ttl(config.pipeline.cache_ttl));
        store.add_listener(cached.clone());
        cached
    } else {
        store.clone()
    };

    let factory = PipelineFactory::new(provider, Arc::new(FunctionRegistry::with_builtins()))
        .with_config(config.pipeline.clone());
    Ok(Engine { store, factory })
}

/// Write every record as NDJSON until the run ends
///
/// A source failure ends the run with `Err` after the records before it
/// were written.
pub(crate) async fn drain(
    output: PipelineOutput,
    mut records: RecordWriter,
    spinner: Option<&ProgressBar>,
) -> Result<PipelineStats> {
    let PipelineOutput { stream, handle, .. } = output;
    let mut lines = ndjson_lines(stream);

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                records.finish()?;
                return Err(e.into());
            }
        };
        records.write_line(&line)?;
        if let Some(pb) = spinner {
            pb.set_message(format!("{} records written", records.lines()));
        }
    }
    records.finish()?;

    let state = handle.finished().await;
    tracing::debug!(%state, "run finished");
    Ok(handle.stats())
}

/// Summary of a finished run
pub(crate) fn summarize(
    mapping: &str,
    direction: fhirmap_core::Direction,
    stats: PipelineStats,
    started: Instant,
    output_file: Option<&Path>,
    warnings: Vec<String>,
) -> RunSummary {
    RunSummary {
        mapping: mapping.to_string(),
        direction,
        run_id: crate::logging::current_run_id().to_string(),
        items_read: stats.items_read as u64,
        data_records: stats.data_records as u64,
        error_records: stats.error_records as u64,
        duration_ms: started.elapsed().as_millis() as u64,
        output_file: output_file.map(|p| p.display().to_string()),
        delivery: None,
        warnings,
    }
}

/// `Err(ItemErrors)` when `fail_on_error` is set and items were rejected
pub(crate) fn check_rejections(summary: &RunSummary, fail_on_error: bool) -> Result<()> {
    if fail_on_error && summary.error_records > 0 {
        return Err(Error::ItemErrors {
            rejected: summary.error_records,
            read: summary.items_read,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use tempfile::NamedTempFile;

    pub const STORE: &str = r#"
mappings:
  - id: "1"
    name: patients-csv
    sourceFormat: tabular
    targetResourceType: Patient
    direction: toTarget
    fieldMappings:
      - sourcePath: sex
        targetPath: gender
        transformationKind: CODE_LOOKUP
        transformationDetails:
          map: { M: male, F: female }
      - sourcePath: born
        targetPath: birthDate
        validationKind: REGEX
        validationDetails: { pattern: "[0-9]{4}-[0-9]{2}-[0-9]{2}" }
  - id: "2"
    name: broken
    sourceFormat: tabular
    targetResourceType: Patient
    direction: toTarget
    fieldMappings:
      - sourcePath: x
        targetPath: nowhere
  - id: "3"
    name: patients-out
    sourceFormat: tabular
    targetResourceType: Patient
    direction: fromTarget
    fieldMappings:
      - sourcePath: sex
        targetPath: gender
schemas:
  - resourceType: Patient
    elements:
      - path: Patient
      - path: Patient.gender
        cardinalityMin: 1
        cardinalityMax: "1"
      - path: Patient.birthDate
        cardinalityMax: "1"
      - path: Patient.active
        cardinalityMax: "1"
        defaultValue: "true"
        defaultValueType: boolean
"#;

    pub fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    pub fn store_file() -> NamedTempFile {
        temp_file(".yaml", STORE)
    }
}
