//! The execution backend abstraction and the task-graph operations built on it.
//!
//! A backend only knows how to run opaque jobs. Everything else (deferred
//! handles, dependency tracking, failure propagation, persistence and
//! blocking collection) lives in [`BackendExt`] so every backend shares the
//! same semantics.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use skyreduce_core::error::PipelineError;
use skyreduce_core::model::Footprint;

use crate::deferred::{Deferred, Dependency, TaskSpec};
use crate::residency::{ResidencyRegistry, ResidencySummary};
use crate::stats::{AtomicTaskStats, TaskStats};

/// A unit of work ready to run.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Hands jobs to wherever they execute.
pub trait Dispatcher: Send + Sync {
    /// Queue or run `job`. Fails once the backend has shut down.
    fn dispatch(&self, job: Job) -> Result<(), PipelineError>;
}

/// Which kind of backend a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Tasks run inline in the calling thread.
    Local,
    /// Tasks run on a pool of worker threads.
    Distributed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Distributed => "distributed",
        })
    }
}

/// A place where tasks execute.
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Number of workers.
    fn workers(&self) -> usize;

    /// Owned handle used to dispatch jobs, including from task callbacks.
    fn dispatcher(&self) -> Arc<dyn Dispatcher>;

    /// Shared task counters.
    fn stats(&self) -> Arc<AtomicTaskStats>;

    /// Registry of persisted results, if the backend keeps one.
    fn residency(&self) -> Option<&ResidencyRegistry> {
        None
    }

    /// Release workers and persisted results. Calling it twice is harmless.
    fn shutdown(&self) -> Result<(), PipelineError>;
}

/// Task-graph operations available on every backend.
pub trait BackendExt {
    /// Submit a task with no inputs.
    fn submit<T, F>(&self, spec: TaskSpec, f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static;

    /// Submit a task that runs once every dependency has succeeded.
    ///
    /// If a dependency fails the task body never runs; the handle settles to
    /// the dependency's failure (a barrier failure for collective tasks).
    fn submit_after<T, F>(&self, spec: TaskSpec, deps: &[&dyn Dependency], f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static;

    /// Like [`BackendExt::submit_after`] for bodies that already produce a shared value.
    fn submit_shared<T, F>(&self, spec: TaskSpec, deps: &[&dyn Dependency], f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Arc<T>, PipelineError> + Send + 'static;

    /// Pin results so they stay resident until released. Returns handles to
    /// the same tasks.
    fn persist<T>(&self, handles: &[Deferred<T>]) -> Vec<Deferred<T>>
    where
        T: Footprint + Send + Sync + 'static;

    /// Block until every handle settles. Values come back in input order;
    /// the first failure in input order is returned instead.
    fn compute<T>(&self, handles: &[Deferred<T>]) -> Result<Vec<Arc<T>>, PipelineError>
    where
        T: Send + Sync + 'static;

    /// Non-blocking [`BackendExt::compute`]: `None` while any handle is pending.
    fn try_compute<T>(&self, handles: &[Deferred<T>]) -> Option<Result<Vec<Arc<T>>, PipelineError>>
    where
        T: Send + Sync + 'static;

    /// Unpin previously persisted results.
    fn release<T>(&self, handles: &[Deferred<T>]);

    /// Task counters.
    fn task_stats(&self) -> TaskStats;

    /// Residency of persisted results; empty for backends without a registry.
    fn residency_summary(&self) -> ResidencySummary;
}

impl<B: ExecutionBackend + ?Sized> BackendExt for B {
    fn submit<T, F>(&self, spec: TaskSpec, f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    {
        self.submit_shared(spec, &[], move || f().map(Arc::new))
    }

    fn submit_after<T, F>(&self, spec: TaskSpec, deps: &[&dyn Dependency], f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    {
        self.submit_shared(spec, deps, move || f().map(Arc::new))
    }

    fn submit_shared<T, F>(&self, spec: TaskSpec, deps: &[&dyn Dependency], f: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Arc<T>, PipelineError> + Send + 'static,
    {
        let handle = Deferred::pending(spec);
        let stats = self.stats();
        stats.record_submitted();
        let launch = Launch {
            handle: handle.clone(),
            body: f,
            stats,
            dispatcher: self.dispatcher(),
        };

        if deps.is_empty() {
            launch.start(&[]);
            return handle;
        }

        let inputs: Arc<Vec<Box<dyn Dependency>>> =
            Arc::new(deps.iter().map(|d| d.boxed()).collect());
        let remaining = Arc::new(AtomicUsize::new(deps.len()));
        let pending = Arc::new(Mutex::new(Some(launch)));
        for dep in deps {
            let inputs = Arc::clone(&inputs);
            let remaining = Arc::clone(&remaining);
            let pending = Arc::clone(&pending);
            dep.on_settled(Box::new(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(launch) = pending.lock().take() {
                        launch.start(&inputs);
                    }
                }
            }));
        }
        handle
    }

    fn persist<T>(&self, handles: &[Deferred<T>]) -> Vec<Deferred<T>>
    where
        T: Footprint + Send + Sync + 'static,
    {
        if let Some(registry) = self.residency() {
            for h in handles {
                registry.pin(h.id(), Box::new(h.clone()));
            }
        }
        handles.to_vec()
    }

    fn compute<T>(&self, handles: &[Deferred<T>]) -> Result<Vec<Arc<T>>, PipelineError>
    where
        T: Send + Sync + 'static,
    {
        let values = handles
            .iter()
            .map(Deferred::wait)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(registry) = self.residency() {
            registry.check_ceiling();
        }
        Ok(values)
    }

    fn try_compute<T>(&self, handles: &[Deferred<T>]) -> Option<Result<Vec<Arc<T>>, PipelineError>>
    where
        T: Send + Sync + 'static,
    {
        handles.iter().map(Deferred::peek).collect::<Option<Vec<_>>>().map(|outcomes| {
            outcomes.into_iter().collect::<Result<Vec<_>, _>>()
        })
    }

    fn release<T>(&self, handles: &[Deferred<T>]) {
        if let Some(registry) = self.residency() {
            for h in handles {
                registry.unpin(h.id());
            }
        }
    }

    fn task_stats(&self) -> TaskStats {
        self.stats().snapshot()
    }

    fn residency_summary(&self) -> ResidencySummary {
        self.residency()
            .map(ResidencyRegistry::summary)
            .unwrap_or_default()
    }
}

/// A submitted task waiting for its inputs.
struct Launch<T, F> {
    handle: Deferred<T>,
    body: F,
    stats: Arc<AtomicTaskStats>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl<T, F> Launch<T, F>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<Arc<T>, PipelineError> + Send + 'static,
{
    fn start(self, inputs: &[Box<dyn Dependency>]) {
        let Self {
            handle,
            body,
            stats,
            dispatcher,
        } = self;

        if let Some(cause) = inputs.iter().find_map(|d| d.failure()) {
            stats.record_failed();
            handle.settle(Err(handle.spec().upstream_failure(cause)));
            return;
        }

        let settle = handle.clone();
        let job_stats = Arc::clone(&stats);
        let job: Job = Box::new(move || run_body(&settle, body, &job_stats));
        if let Err(e) = dispatcher.dispatch(job) {
            stats.record_failed();
            handle.settle(Err(e));
        }
    }
}

fn run_body<T, F>(handle: &Deferred<T>, body: F, stats: &AtomicTaskStats)
where
    F: FnOnce() -> Result<Arc<T>, PipelineError>,
{
    let spec = handle.spec();
    let started = Instant::now();
    let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(spec.failure(e)),
        Err(payload) => Err(spec.failure(PipelineError::Collaborator(panic_message(
            payload.as_ref(),
        )))),
    };
    match &outcome {
        Ok(_) => stats.record_completed(),
        Err(_) => stats.record_failed(),
    }
    debug!(
        task = %spec.label,
        partition = ?spec.partition,
        ok = outcome.is_ok(),
        elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        "task finished"
    );
    handle.settle(outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
