//! Serial backend: every task runs in the submitting thread.

use std::sync::Arc;

use skyreduce_core::error::PipelineError;

use crate::backend::{BackendKind, Dispatcher, ExecutionBackend, Job};
use crate::stats::AtomicTaskStats;

struct Inline;

impl Dispatcher for Inline {
    fn dispatch(&self, job: Job) -> Result<(), PipelineError> {
        job();
        Ok(())
    }
}

/// Runs tasks inline at submission time.
///
/// Tasks that wait on inputs run as soon as the last input settles, which in
/// this backend is always before `submit_after` returns. Persisting is a
/// no-op and shutdown releases nothing.
pub struct LocalBackend {
    dispatcher: Arc<dyn Dispatcher>,
    stats: Arc<AtomicTaskStats>,
}

impl LocalBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(Inline),
            stats: Arc::new(AtomicTaskStats::new()),
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn workers(&self) -> usize {
        1
    }

    fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    fn stats(&self) -> Arc<AtomicTaskStats> {
        Arc::clone(&self.stats)
    }

    fn shutdown(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
