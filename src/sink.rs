use std::sync::{Mutex, PoisonError};

use crate::model::{LifecycleEvent, Phase, WorkerId};

/// Receives every lifecycle event the executors emit.
pub trait LifecycleSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

/// Discards everything.
pub struct NullSink;

impl LifecycleSink for NullSink {
    fn emit(&self, _event: &LifecycleEvent) {}
}

/// Keeps every event in memory. Used by tests and the stress bench.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Phases emitted for one operation, in order.
    pub fn phases(&self, worker: WorkerId, seq: u64) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter(|e| e.worker == worker && e.seq == seq)
            .map(|e| e.phase)
            .collect()
    }
}

impl LifecycleSink for MemorySink {
    fn emit(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*event);
    }
}
