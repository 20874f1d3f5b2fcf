//! Worker-pool backend.
//!
//! A central queue feeds `N` worker threads. Each worker owns a rayon pool of
//! `threads_per_worker` threads and runs its jobs inside it, so collaborators
//! that parallelise internally stay within their worker's share of the host.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use skyreduce_core::error::PipelineError;

use crate::backend::{BackendKind, Dispatcher, ExecutionBackend, Job};
use crate::config::BackendConfig;
use crate::residency::ResidencyRegistry;
use crate::stats::AtomicTaskStats;

struct DispatchQueue {
    sender: RwLock<Option<Sender<Job>>>,
}

impl Dispatcher for DispatchQueue {
    fn dispatch(&self, job: Job) -> Result<(), PipelineError> {
        match self.sender.read().as_ref() {
            Some(tx) => tx.send(job).map_err(|_| PipelineError::BackendShutdown),
            None => Err(PipelineError::BackendShutdown),
        }
    }
}

/// Pool of worker threads fed from a shared queue.
pub struct DistributedBackend {
    queue: Arc<DispatchQueue>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    workers: usize,
    threads_per_worker: usize,
    scratch: Vec<PathBuf>,
    stats: Arc<AtomicTaskStats>,
    residency: ResidencyRegistry,
}

impl DistributedBackend {
    /// Start the pool described by `config`.
    ///
    /// Creates `<local_directory>/worker-<i>` for every worker before any
    /// thread starts.
    pub fn start(config: &BackendConfig) -> Result<Self, PipelineError> {
        let workers = config.resolved_workers();
        let threads_per_worker = config.threads_per_worker;
        if threads_per_worker == 0 {
            return Err(PipelineError::BackendStartup(
                "threads per worker must be at least 1".into(),
            ));
        }

        let scratch = (0..workers)
            .map(|i| {
                let dir = config.local_directory.join(format!("worker-{i}"));
                std::fs::create_dir_all(&dir).map_err(|e| {
                    PipelineError::BackendStartup(format!(
                        "cannot create scratch directory {}: {e}",
                        dir.display()
                    ))
                })?;
                Ok(dir)
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let (tx, rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            match spawn_worker(index, threads_per_worker, rx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    drop(tx);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        let ceiling = config
            .memory_ceiling()
            .map(|bytes| usize::try_from(bytes).unwrap_or(usize::MAX));
        info!(
            workers,
            threads_per_worker,
            memory_ceiling = ?ceiling,
            local_directory = %config.local_directory.display(),
            "worker pool started"
        );

        Ok(Self {
            queue: Arc::new(DispatchQueue {
                sender: RwLock::new(Some(tx)),
            }),
            handles: Mutex::new(handles),
            workers,
            threads_per_worker,
            scratch,
            stats: Arc::new(AtomicTaskStats::new()),
            residency: ResidencyRegistry::new(ceiling),
        })
    }

    /// Threads in each worker's pool.
    #[must_use]
    pub fn threads_per_worker(&self) -> usize {
        self.threads_per_worker
    }

    /// Per-worker scratch directories, indexed by worker.
    #[must_use]
    pub fn scratch_dirs(&self) -> &[PathBuf] {
        &self.scratch
    }

    /// Whether the pool still accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.queue.sender.read().is_some()
    }
}

fn spawn_worker(
    index: usize,
    threads: usize,
    jobs: Receiver<Job>,
) -> Result<JoinHandle<()>, PipelineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |t| format!("skyreduce-w{index}-{t}"))
        .build()
        .map_err(|e| PipelineError::BackendStartup(format!("worker {index}: {e}")))?;

    thread::Builder::new()
        .name(format!("skyreduce-worker-{index}"))
        .spawn(move || {
            let mut ran = 0_u64;
            for job in &jobs {
                pool.install(job);
                ran += 1;
            }
            debug!(worker = index, jobs = ran, "worker stopped");
        })
        .map_err(|e| PipelineError::BackendStartup(format!("worker {index}: {e}")))
}

impl ExecutionBackend for DistributedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.queue.clone()
    }

    fn stats(&self) -> Arc<AtomicTaskStats> {
        Arc::clone(&self.stats)
    }

    fn residency(&self) -> Option<&ResidencyRegistry> {
        Some(&self.residency)
    }

    /// Stop accepting work, let queued jobs drain, then join the workers.
    fn shutdown(&self) -> Result<(), PipelineError> {
        let Some(sender) = self.queue.sender.write().take() else {
            return Ok(());
        };
        drop(sender);

        let handles = std::mem::take(&mut *self.handles.lock());
        let mut lost = 0_usize;
        for handle in handles {
            if handle.join().is_err() {
                lost += 1;
            }
        }
        self.residency.clear();

        let stats = self.stats.snapshot();
        info!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            "worker pool shut down"
        );
        if lost > 0 {
            warn!(lost, "workers terminated abnormally");
        }
        Ok(())
    }
}

impl Drop for DistributedBackend {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendExt;
    use crate::deferred::{Dependency, TaskSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(dir: &std::path::Path, workers: i32) -> BackendConfig {
        BackendConfig {
            serial: false,
            nworkers: workers,
            threads_per_worker: 2,
            memory_per_worker: None,
            local_directory: dir.to_path_buf(),
        }
    }

    #[test]
    fn creates_scratch_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 3)).unwrap();
        assert_eq!(backend.workers(), 3);
        for (i, dir) in backend.scratch_dirs().iter().enumerate() {
            assert!(dir.ends_with(format!("worker-{i}")));
            assert!(dir.is_dir());
        }
        backend.shutdown().unwrap();
    }

    #[test]
    fn compute_preserves_submission_order() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 4)).unwrap();
        let handles: Vec<_> = (0..32_u64)
            .map(|i| {
                backend.submit(TaskSpec::new("square").partition(i as usize), move || {
                    std::thread::sleep(std::time::Duration::from_micros((32 - i) * 50));
                    Ok(i * i)
                })
            })
            .collect();
        let values = backend.compute(&handles).unwrap();
        let got: Vec<u64> = values.iter().map(|v| **v).collect();
        let want: Vec<u64> = (0..32).map(|i| i * i).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn fan_in_waits_for_all_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 2)).unwrap();
        let parts: Vec<_> = (1..=4_u64)
            .map(|i| backend.submit(TaskSpec::new("part").partition(i as usize), move || Ok(i)))
            .collect();
        let inputs = parts.clone();
        let deps: Vec<&dyn Dependency> = parts.iter().map(|p| p as &dyn Dependency).collect();
        let total = backend.submit_after(TaskSpec::new("sum").collective(), &deps, move || {
            inputs.iter().map(|p| p.get().map(|v| *v)).sum::<Result<u64, _>>()
        });
        assert_eq!(*backend.compute(&[total]).unwrap()[0], 10);
    }

    #[test]
    fn collective_input_failure_is_barrier_error() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 2)).unwrap();
        let ok = backend.submit(TaskSpec::new("ingest").partition(0), || Ok(1_u32));
        let bad = backend.submit::<u32, _>(TaskSpec::new("ingest").partition(1), || {
            Err(PipelineError::Collaborator("corrupt".into()))
        });
        let barrier = backend.submit_after(
            TaskSpec::new("weighting").collective(),
            &[&ok as &dyn Dependency, &bad],
            || Ok(0_u32),
        );
        match backend.compute(&[barrier]).unwrap_err() {
            PipelineError::CollectiveBarrier(msg) => assert!(msg.contains("partition 1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn persist_pins_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(tmp.path(), 2);
        cfg.memory_per_worker = Some(1);
        let backend = DistributedBackend::start(&cfg).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let runs = Arc::clone(&runs);
                backend.submit(TaskSpec::new("vis"), move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![0.0_f64; 64])
                })
            })
            .collect();
        let persisted = backend.persist(&handles);
        backend.compute(&persisted).unwrap();
        backend.compute(&persisted).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        let summary = backend.residency_summary();
        assert_eq!(summary.pinned, 3);
        assert!(summary.over_ceiling());

        backend.release(&persisted);
        assert_eq!(backend.residency_summary().pinned, 0);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 1)).unwrap();
        backend.shutdown().unwrap();
        backend.shutdown().unwrap();
        assert!(!backend.is_running());
        let d = backend.submit(TaskSpec::new("late"), || Ok(1_u8));
        assert_eq!(
            backend.compute(&[d]).unwrap_err(),
            PipelineError::BackendShutdown
        );
    }

    #[test]
    fn queued_work_drains_on_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DistributedBackend::start(&config(tmp.path(), 1)).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| backend.submit(TaskSpec::new("slow"), move || Ok(i)))
            .collect();
        backend.shutdown().unwrap();
        assert!(handles.iter().all(crate::deferred::Deferred::is_settled));
    }

    #[test]
    fn unwritable_scratch_fails_startup() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = DistributedBackend::start(&config(&file, 1)).err().unwrap();
        assert!(matches!(err, PipelineError::BackendStartup(_)));
    }
}
