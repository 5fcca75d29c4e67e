//! Pipeline run state, published through a watch channel

use crate::types::StreamRecord;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Reading,
    Mapping,
    /// Auto-population and mandatory checks (ToTarget only)
    Enriching,
    Emitting,
    Done,
    /// The source failed and the run ended
    Error,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Error)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Reading => "reading",
            PipelineState::Mapping => "mapping",
            PipelineState::Enriching => "enriching",
            PipelineState::Emitting => "emitting",
            PipelineState::Done => "done",
            PipelineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub items_read: usize,
    pub data_records: usize,
    pub error_records: usize,
}

#[derive(Debug, Default)]
struct Counters {
    items_read: AtomicUsize,
    data_records: AtomicUsize,
    error_records: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            items_read: self.items_read.load(Ordering::Relaxed),
            data_records: self.data_records.load(Ordering::Relaxed),
            error_records: self.error_records.load(Ordering::Relaxed),
        }
    }
}

/// Writer side, owned by the stage driver
#[derive(Debug, Clone)]
pub struct PipelineTracker {
    state: Arc<watch::Sender<PipelineState>>,
    counters: Arc<Counters>,
}

impl PipelineTracker {
    pub fn set(&self, state: PipelineState) {
        self.state.send_replace(state);
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub(crate) fn item_read(&self) {
        self.counters.items_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, record: &StreamRecord) {
        let counter = if record.is_data() {
            &self.counters.data_records
        } else {
            &self.counters.error_records
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Observer side, returned to the caller
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    run_id: u64,
    state: watch::Receiver<PipelineState>,
    counters: Arc<Counters>,
}

impl PipelineHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Wait until the run is done or failed
    pub async fn finished(&self) -> PipelineState {
        let mut receiver = self.state.clone();
        let result = receiver.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        match result {
            Ok(state) => state,
            // driver gone without a terminal state
            Err(_) => *receiver.borrow(),
        }
    }
}

/// Linked tracker and handle, starting in `Idle`
pub fn channel(run_id: u64) -> (PipelineTracker, PipelineHandle) {
    let (sender, receiver) = watch::channel(PipelineState::Idle);
    let counters = Arc::new(Counters::default());
    (
        PipelineTracker {
            state: Arc::new(sender),
            counters: Arc::clone(&counters),
        },
        PipelineHandle {
            run_id,
            state: receiver,
            counters,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_tracker_updates_handle() {
        let (tracker, handle) = channel(7);
        assert_eq!(handle.state(), PipelineState::Idle);
        assert_eq!(handle.run_id(), 7);

        tracker.set(PipelineState::Mapping);
        assert_eq!(handle.state(), PipelineState::Mapping);

        tracker.item_read();
        tracker.record(&StreamRecord::data(json!({})));
        tracker.record(&StreamRecord::error(json!({}), vec![]));
        assert_eq!(
            handle.stats(),
            PipelineStats {
                items_read: 1,
                data_records: 1,
                error_records: 1
            }
        );

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.finished().await }
        });
        tracker.set(PipelineState::Done);
        assert_eq!(waiter.await.unwrap(), PipelineState::Done);
    }

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Error.is_terminal());
        assert!(!PipelineState::Emitting.is_terminal());
        assert_eq!(PipelineState::Enriching.to_string(), "enriching");
    }
}
