//! Deferred task handles.
//!
//! A `Deferred<T>` names the eventual result of one submitted unit of work.
//! Handles are cheap to clone and all clones observe the same outcome. A
//! handle settles exactly once, to either a shared value or a
//! `PipelineError`; it is never re-executed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use skyreduce_core::error::PipelineError;
use skyreduce_core::model::Footprint;

/// Process-unique task identifier.
pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

type Callback = Box<dyn FnOnce() + Send>;

/// Description of a unit of work, used for diagnostics and error attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Short task name, e.g. `ingest`.
    pub label: String,
    /// Partition the task belongs to, if any.
    pub partition: Option<usize>,
    /// Collective tasks consume every partition at once; their failures are
    /// reported as barrier failures.
    pub collective: bool,
}

impl TaskSpec {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            partition: None,
            collective: false,
        }
    }

    #[must_use]
    pub fn partition(mut self, partition: usize) -> Self {
        self.partition = Some(partition);
        self
    }

    #[must_use]
    pub fn collective(mut self) -> Self {
        self.collective = true;
        self
    }

    /// Error reported when the task body itself fails.
    pub(crate) fn failure(&self, cause: PipelineError) -> PipelineError {
        if self.collective {
            match cause {
                e @ PipelineError::CollectiveBarrier(_) => e,
                other => PipelineError::CollectiveBarrier(format!("{}: {other}", self.label)),
            }
        } else {
            PipelineError::task(self.label.clone(), self.partition, cause)
        }
    }

    /// Error reported when one of the task's inputs failed.
    pub(crate) fn upstream_failure(&self, cause: PipelineError) -> PipelineError {
        if self.collective {
            let origin = cause
                .partition()
                .map_or_else(String::new, |p| format!(" from partition {p}"));
            PipelineError::CollectiveBarrier(format!(
                "{}: input{origin} unavailable: {cause}",
                self.label
            ))
        } else {
            PipelineError::task(self.label.clone(), self.partition, cause)
        }
    }
}

enum Slot<T> {
    Pending,
    Ready(Arc<T>),
    Failed(PipelineError),
}

struct State<T> {
    slot: Slot<T>,
    waiters: Vec<Callback>,
}

struct Cell<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// Handle to the eventual result of a submitted task.
pub struct Deferred<T> {
    id: TaskId,
    spec: Arc<TaskSpec>,
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            spec: Arc::clone(&self.spec),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.id)
            .field("label", &self.spec.label)
            .field("partition", &self.spec.partition)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> Deferred<T> {
    pub(crate) fn pending(spec: TaskSpec) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            spec: Arc::new(spec),
            cell: Arc::new(Cell {
                state: Mutex::new(State {
                    slot: Slot::Pending,
                    waiters: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Task description.
    #[must_use]
    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    /// Whether both handles refer to the same task.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.cell, &b.cell)
    }

    /// Whether the task has finished, successfully or not.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self.cell.state.lock().slot, Slot::Pending)
    }

    /// The outcome if the task has settled, without blocking.
    #[must_use]
    pub fn peek(&self) -> Option<Result<Arc<T>, PipelineError>> {
        match &self.cell.state.lock().slot {
            Slot::Pending => None,
            Slot::Ready(value) => Some(Ok(Arc::clone(value))),
            Slot::Failed(e) => Some(Err(e.clone())),
        }
    }

    /// The value of a task that is known to have settled.
    ///
    /// Intended for task bodies reading their declared inputs, which are
    /// always settled by the time the body runs.
    pub fn get(&self) -> Result<Arc<T>, PipelineError> {
        self.peek().unwrap_or_else(|| {
            Err(PipelineError::task(
                self.spec.label.clone(),
                self.spec.partition,
                PipelineError::Collaborator("result read before the task completed".into()),
            ))
        })
    }

    /// Block the calling thread until the task settles.
    pub(crate) fn wait(&self) -> Result<Arc<T>, PipelineError> {
        let mut state = self.cell.state.lock();
        loop {
            match &state.slot {
                Slot::Pending => self.cell.settled.wait(&mut state),
                Slot::Ready(value) => return Ok(Arc::clone(value)),
                Slot::Failed(e) => return Err(e.clone()),
            }
        }
    }

    /// Record the outcome. Only the first call has an effect.
    pub(crate) fn settle(&self, outcome: Result<Arc<T>, PipelineError>) {
        let waiters = {
            let mut state = self.cell.state.lock();
            if !matches!(state.slot, Slot::Pending) {
                return;
            }
            state.slot = match outcome {
                Ok(value) => Slot::Ready(value),
                Err(e) => Slot::Failed(e),
            };
            std::mem::take(&mut state.waiters)
        };
        self.cell.settled.notify_all();
        for waiter in waiters {
            waiter();
        }
    }

    /// Run `callback` once the task settles; immediately if it already has.
    pub(crate) fn when_settled(&self, callback: Callback) {
        {
            let mut state = self.cell.state.lock();
            if matches!(state.slot, Slot::Pending) {
                state.waiters.push(callback);
                return;
            }
        }
        callback();
    }
}

/// Type-erased view of a deferred task used to declare dependencies.
pub trait Dependency: Send + Sync {
    /// Identifier of the task.
    fn task_id(&self) -> TaskId;

    /// Register a callback for when the task settles.
    fn on_settled(&self, callback: Box<dyn FnOnce() + Send>);

    /// The failure, if the task settled unsuccessfully.
    fn failure(&self) -> Option<PipelineError>;

    /// Clone into an owned trait object.
    fn boxed(&self) -> Box<dyn Dependency>;
}

impl<T: Send + Sync + 'static> Dependency for Deferred<T> {
    fn task_id(&self) -> TaskId {
        self.id
    }

    fn on_settled(&self, callback: Box<dyn FnOnce() + Send>) {
        self.when_settled(callback);
    }

    fn failure(&self) -> Option<PipelineError> {
        match &self.cell.state.lock().slot {
            Slot::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    fn boxed(&self) -> Box<dyn Dependency> {
        Box::new(self.clone())
    }
}

/// A persisted task held by a backend's residency registry.
pub trait Pinned: Send + Sync {
    fn label(&self) -> &str;

    /// Footprint of the value, or zero while the task is pending or failed.
    fn resident_bytes(&self) -> usize;
}

impl<T: Footprint + Send + Sync + 'static> Pinned for Deferred<T> {
    fn label(&self) -> &str {
        &self.spec.label
    }

    fn resident_bytes(&self) -> usize {
        match &self.cell.state.lock().slot {
            Slot::Ready(value) => value.footprint(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn settle_once() {
        let d: Deferred<u32> = Deferred::pending(TaskSpec::new("t"));
        assert!(!d.is_settled());
        d.settle(Ok(Arc::new(1)));
        d.settle(Ok(Arc::new(2)));
        assert_eq!(*d.get().unwrap(), 1);
    }

    #[test]
    fn clones_share_outcome() {
        let d: Deferred<String> = Deferred::pending(TaskSpec::new("t"));
        let c = d.clone();
        assert!(Deferred::ptr_eq(&d, &c));
        d.settle(Ok(Arc::new("x".into())));
        assert_eq!(c.get().unwrap().as_str(), "x");
    }

    #[test]
    fn get_before_settle_is_error() {
        let d: Deferred<u32> = Deferred::pending(TaskSpec::new("advise").partition(2));
        let err = d.get().unwrap_err();
        assert_eq!(err.partition(), Some(2));
    }

    #[test]
    fn waiters_run_on_settle_or_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let d: Deferred<u32> = Deferred::pending(TaskSpec::new("t"));
        let c = Arc::clone(&count);
        d.when_settled(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        d.settle(Err(PipelineError::Collaborator("x".into())));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = Arc::clone(&count);
        d.when_settled(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(Dependency::failure(&d).is_some());
    }

    #[test]
    fn wait_blocks_until_settled() {
        let d: Deferred<u32> = Deferred::pending(TaskSpec::new("t"));
        let setter = d.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            setter.settle(Ok(Arc::new(7)));
        });
        assert_eq!(*d.wait().unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn collective_failures_become_barrier_errors() {
        let spec = TaskSpec::new("weighting").collective();
        let upstream = PipelineError::TaskExecution {
            task: "ingest".into(),
            partition: Some(1),
            message: "bad".into(),
        };
        match spec.upstream_failure(upstream) {
            PipelineError::CollectiveBarrier(msg) => assert!(msg.contains("partition 1")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            spec.failure(PipelineError::Collaborator("x".into())),
            PipelineError::CollectiveBarrier(_)
        ));
    }

    #[test]
    fn plain_failures_keep_partition() {
        let spec = TaskSpec::new("ingest").partition(4);
        let err = spec.failure(PipelineError::Collaborator("x".into()));
        assert_eq!(err.partition(), Some(4));
    }

    #[test]
    fn pinned_footprint_only_when_ready() {
        let d: Deferred<Vec<f64>> = Deferred::pending(TaskSpec::new("t"));
        assert_eq!(Pinned::resident_bytes(&d), 0);
        d.settle(Ok(Arc::new(vec![0.0; 4])));
        assert!(Pinned::resident_bytes(&d) >= 32);
    }
}
