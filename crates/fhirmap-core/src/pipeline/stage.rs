//! Stage driver: pulls items, isolates per-item failures, forwards records
//!
//! The driver always forwards a tagged [`StreamRecord`]; an item failure,
//! including a panic inside a processor, never closes the channel. Only a
//! source error ends the run early, as a terminal `Err` item.

use super::source::ItemIter;
use super::state::{PipelineState, PipelineTracker};
use crate::delivery::{deliver_detached, DeliverySink};
use crate::remote::ResourceStream;
use crate::types::{FieldProcessingError, StreamRecord};
use crate::Result;
use futures::StreamExt;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Per-item transform of one direction
pub trait ItemProcessor: Send + Sync {
    /// `Ok(None)` when the item produces nothing
    fn process(&self, item: &Value, tracker: &PipelineTracker) -> std::result::Result<Option<Value>, Vec<FieldProcessingError>>;
}

/// Processing half shared by the blocking and async drivers
pub(crate) struct StageDriver {
    pub processor: Arc<dyn ItemProcessor>,
    pub tracker: PipelineTracker,
    pub sink: Option<Arc<dyn DeliverySink>>,
}

impl StageDriver {
    /// Process one item into the record to emit, if any
    fn handle(&self, item: Value) -> Option<StreamRecord> {
        self.tracker.item_read();
        let record = run_isolated(self.processor.as_ref(), item, &self.tracker)?;

        self.tracker.set(PipelineState::Emitting);
        if let (Some(sink), Some(resource)) = (&self.sink, record.item()) {
            deliver_detached(Arc::clone(sink), resource.clone());
        }
        self.tracker.record(&record);
        match &record {
            StreamRecord::Data { .. } => tracing::debug!("item produced"),
            StreamRecord::Error { errors, .. } => tracing::debug!(errors = errors.len(), "item rejected"),
        }
        Some(record)
    }

    /// Drive a synchronous item iterator on the blocking pool
    pub fn spawn_blocking(self, mut items: ItemIter, tx: mpsc::Sender<Result<StreamRecord>>, span: tracing::Span) {
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            loop {
                self.tracker.set(PipelineState::Reading);
                let item = match items.next() {
                    None => break,
                    Some(Ok(item)) => item,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "source failed, ending run");
                        self.tracker.set(PipelineState::Error);
                        let _ = tx.blocking_send(Err(e));
                        return;
                    }
                };
                let Some(record) = self.handle(item) else {
                    continue;
                };
                if tx.blocking_send(Ok(record)).is_err() {
                    tracing::debug!("output dropped, source no longer pulled");
                    break;
                }
            }
            self.finish();
        });
    }

    /// Drive an async resource stream on the runtime
    pub fn spawn_async(self, mut items: ResourceStream, tx: mpsc::Sender<Result<StreamRecord>>, span: tracing::Span) {
        tokio::spawn(
            async move {
                loop {
                    self.tracker.set(PipelineState::Reading);
                    let item = tokio::select! {
                        _ = tx.closed() => {
                            tracing::debug!("output dropped, remote source no longer pulled");
                            break;
                        }
                        next = items.next() => match next {
                            None => break,
                            Some(Ok(item)) => item,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "remote source failed, ending run");
                                self.tracker.set(PipelineState::Error);
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        },
                    };
                    let Some(record) = self.handle(item) else {
                        continue;
                    };
                    if tx.send(Ok(record)).await.is_err() {
                        tracing::debug!("output dropped, remote source no longer pulled");
                        break;
                    }
                }
                self.finish();
            }
            .instrument(span),
        );
    }

    fn finish(&self) {
        self.tracker.set(PipelineState::Done);
        tracing::info!(stats = ?self.tracker.stats(), "pipeline finished");
    }
}

/// Run the processor, turning a panic into a `Processing` error record
pub(crate) fn run_isolated(processor: &dyn ItemProcessor, item: Value, tracker: &PipelineTracker) -> Option<StreamRecord> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(&item, tracker)));
    match outcome {
        Ok(Ok(Some(output))) => Some(StreamRecord::data(output)),
        Ok(Ok(None)) => None,
        Ok(Err(errors)) => Some(StreamRecord::error(item, errors)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "item processing panicked");
            Some(StreamRecord::error(
                item,
                vec![FieldProcessingError::processing(format!("Unexpected failure: {message}"))],
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
