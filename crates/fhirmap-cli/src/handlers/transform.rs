//! Transform command handler

use super::{check_rejections, drain, engine, summarize};
use crate::cli::TransformArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::{DeliveryCounts, OutputWriter, RecordWriter};
use counting::CountingSink;
use fhirmap_core::{HttpDeliverySink, PipelineInput};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, Instrument};

/// Handle the transform command
#[instrument(skip_all, fields(mapping = %args.mapping))]
pub async fn handle_transform(args: TransformArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let timer = Timer::with_details("transform", &args.mapping);
    let started = Instant::now();

    let engine = engine(config, args.store.store.as_deref())?;
    let mut factory = engine.factory;

    let counting = if args.deliver {
        let sink = HttpDeliverySink::new(&config.server.delivery()?)?;
        let counting = Arc::new(CountingSink::new(Arc::new(sink)));
        factory = factory.with_delivery_sink(counting.clone());
        Some(counting)
    } else {
        None
    };

    let reader = open_input(&args)?;
    if args.save_to.is_none() {
        output.move_to_stderr();
    }

    let run = factory.create_pipeline(&args.mapping, PipelineInput::Source(reader));
    let pipeline = run.instrument(timer.span().clone()).await?;
    for warning in &pipeline.warnings {
        output.warning(warning)?;
    }
    let direction = pipeline.descriptor.direction;
    let warnings = pipeline.warnings.clone();
    info!(file = %pipeline.descriptor.file_name, "pipeline started");

    let spinner = output.spinner("Transforming...");
    let records = RecordWriter::open(args.save_to.as_deref())?;
    let stats = drain(pipeline, records, spinner.as_ref()).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let stats = stats?;

    let mut summary = summarize(&args.mapping, direction, stats, started, args.save_to.as_deref(), warnings);
    if let Some(counting) = counting {
        let wait = Duration::from_secs(config.server.timeout_secs.max(1));
        summary.delivery = Some(counting.wait_for(summary.data_records, wait).await);
    }
    output.summary(&summary)?;
    check_rejections(&summary, args.fail_on_error)
}

fn open_input(args: &TransformArgs) -> Result<Box<dyn Read + Send>> {
    if args.input.as_os_str() == "-" {
        return Ok(Box::new(io::stdin()));
    }
    if !args.input.exists() {
        return Err(Error::FileNotFound {
            path: args.input.clone(),
        });
    }
    Ok(Box::new(BufReader::new(File::open(&args.input)?)))
}

mod counting {
    //! Delivery sink wrapper that counts outcomes, so the command can wait
    //! for detached deliveries before the runtime shuts down.

    use super::DeliveryCounts;
    use fhirmap_core::{DeliveryReceipt, DeliverySink};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    pub struct CountingSink {
        inner: Arc<dyn DeliverySink>,
        delivered: AtomicU64,
        failed: AtomicU64,
    }

    impl CountingSink {
        pub fn new(inner: Arc<dyn DeliverySink>) -> Self {
            Self {
                inner,
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }
        }

        pub fn counts(&self, expected: u64) -> DeliveryCounts {
            let delivered = self.delivered.load(Ordering::Acquire);
            let failed = self.failed.load(Ordering::Acquire);
            DeliveryCounts {
                delivered,
                failed,
                pending: expected.saturating_sub(delivered + failed),
            }
        }

        /// Poll until `expected` deliveries finished or `timeout` passed
        pub async fn wait_for(&self, expected: u64, timeout: Duration) -> DeliveryCounts {
            let deadline = Instant::now() + timeout;
            loop {
                let counts = self.counts(expected);
                if counts.pending == 0 || Instant::now() >= deadline {
                    return counts;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    #[async_trait::async_trait]
    impl DeliverySink for CountingSink {
        async fn deliver(&self, resource: &Value) -> fhirmap_core::Result<DeliveryReceipt> {
            let outcome = self.inner.deliver(resource).await;
            match &outcome {
                Ok(_) => self.delivered.fetch_add(1, Ordering::AcqRel),
                Err(_) => self.failed.fetch_add(1, Ordering::AcqRel),
            };
            outcome
        }
    }
}
