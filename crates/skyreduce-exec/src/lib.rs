//! # skyreduce-exec
//!
//! Execution backends for the `SkyReduce` pipeline.
//!
//! Work is expressed as deferred tasks. A backend runs them, either inline
//! (serial mode) or on a pool of workers fed from a central queue, and the
//! shared [`BackendExt`] operations submit, persist, compute and release them.

pub mod backend;
pub mod config;
pub mod deferred;
pub mod distributed;
pub mod local;
pub mod residency;
pub mod stats;

pub use backend::{BackendExt, BackendKind, Dispatcher, ExecutionBackend, Job};
pub use config::{connect, BackendConfig, HostResources};
pub use deferred::{Deferred, Dependency, Pinned, TaskId, TaskSpec};
pub use distributed::DistributedBackend;
pub use local::LocalBackend;
pub use residency::{ResidencyRegistry, ResidencySummary};
pub use stats::{AtomicTaskStats, TaskStats};
