//! Backend configuration and connection.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use sysinfo::System;
use tracing::info;

use skyreduce_core::constants::{
    DEFAULT_THREADS_PER_WORKER, DEFAULT_WORKERS, DEFAULT_WORKER_MEMORY_GIB, GIB,
};
use skyreduce_core::error::PipelineError;

use crate::backend::ExecutionBackend;
use crate::distributed::DistributedBackend;
use crate::local::LocalBackend;

/// How to run tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendConfig {
    /// Run everything in the calling thread.
    pub serial: bool,
    /// Worker count; zero or negative means size from the host.
    pub nworkers: i32,
    pub threads_per_worker: usize,
    /// Per-worker memory ceiling in bytes. `None` sizes from the host when
    /// workers are auto-detected and disables the ceiling otherwise.
    pub memory_per_worker: Option<u64>,
    /// Parent of the per-worker scratch directories.
    pub local_directory: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            serial: false,
            nworkers: DEFAULT_WORKERS,
            threads_per_worker: DEFAULT_THREADS_PER_WORKER,
            memory_per_worker: Some(DEFAULT_WORKER_MEMORY_GIB * GIB),
            local_directory: std::env::temp_dir().join("skyreduce"),
        }
    }
}

impl BackendConfig {
    /// Serial configuration.
    #[must_use]
    pub fn serial() -> Self {
        Self {
            serial: true,
            ..Self::default()
        }
    }

    /// Whether the worker count comes from the host.
    #[must_use]
    pub fn auto_workers(&self) -> bool {
        self.nworkers <= 0
    }

    /// Effective worker count, always at least one.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.auto_workers() {
            HostResources::detect().workers_for(self.threads_per_worker)
        } else {
            usize::try_from(self.nworkers).unwrap_or(1).max(1)
        }
    }

    /// Ceiling on persisted results across all workers, in bytes.
    #[must_use]
    pub fn memory_ceiling(&self) -> Option<u64> {
        let workers = self.resolved_workers() as u64;
        match self.memory_per_worker {
            Some(per_worker) => Some(per_worker.saturating_mul(workers)),
            None if self.auto_workers() => {
                let host = HostResources::detect();
                (host.total_memory > 0).then_some(host.total_memory)
            }
            None => None,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.threads_per_worker == 0 {
            return Err(PipelineError::Config(
                "threads per worker must be at least 1".into(),
            ));
        }
        if self.memory_per_worker == Some(0) {
            return Err(PipelineError::Config(
                "memory per worker must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Host capacity used to size an auto-detected pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub cpus: usize,
    /// Total memory in bytes.
    pub total_memory: u64,
}

impl HostResources {
    #[must_use]
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        let cpus = match system.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            n => n,
        };
        Self {
            cpus,
            total_memory: system.total_memory(),
        }
    }

    /// One worker per `threads_per_worker` cores, at least one.
    #[must_use]
    pub fn workers_for(&self, threads_per_worker: usize) -> usize {
        (self.cpus / threads_per_worker.max(1)).max(1)
    }
}

/// Start the backend `config` describes.
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn ExecutionBackend>, PipelineError> {
    config.validate()?;
    if config.serial {
        info!("running serially in the calling thread");
        return Ok(Arc::new(LocalBackend::new()));
    }
    Ok(Arc::new(DistributedBackend::start(config)?))
}
