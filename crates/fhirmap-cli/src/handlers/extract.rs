//! Extract command handler

use super::{check_rejections, drain, engine, summarize};
use crate::cli::ExtractArgs;
use crate::config::Config;
use crate::error::Result;
use crate::logging::timing::Timer;
use crate::output::{OutputWriter, RecordWriter};
use fhirmap_core::{HttpRecordSource, PipelineInput};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, Instrument};

/// Handle the extract command
#[instrument(skip_all, fields(mapping = %args.mapping, query = %args.query))]
pub async fn handle_extract(args: ExtractArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let timer = Timer::with_details("extract", &args.mapping);
    let started = Instant::now();

    let remote = config.server.remote_source(args.server.as_deref())?;
    info!(server = %remote.base_url, "extracting from server");
    let buffer = remote.page_buffer;
    let source = HttpRecordSource::new(remote)?;

    let engine = engine(config, args.store.store.as_deref())?;
    if args.save_to.is_none() {
        output.move_to_stderr();
    }

    let input = PipelineInput::remote(Arc::new(source), args.query.clone(), buffer);
    let pipeline = engine
        .factory
        .create_pipeline(&args.mapping, input)
        .instrument(timer.span().clone())
        .await?;
    for warning in &pipeline.warnings {
        output.warning(warning)?;
    }
    let direction = pipeline.descriptor.direction;
    let warnings = pipeline.warnings.clone();

    let spinner = output.spinner("Extracting...");
    let records = RecordWriter::open(args.save_to.as_deref())?;
    let stats = drain(pipeline, records, spinner.as_ref()).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let stats = stats?;

    let summary = summarize(&args.mapping, direction, stats, started, args.save_to.as_deref(), warnings);
    output.summary(&summary)?;
    check_rejections(&summary, args.fail_on_error)
}
