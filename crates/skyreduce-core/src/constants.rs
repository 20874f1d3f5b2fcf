//! Defaults and fixed parameters of the reduction pipeline.

/// w-step used by the `2d` context: large enough that every sample lands in a
/// single plane.
pub const TWO_D_WSTEP: f64 = 1e15;

/// Margin applied to the advisory w-step when no explicit step is given.
pub const WSTEP_MARGIN: f64 = 1.1;

/// Lower bound on kernel support for the hybrid w-projection/w-stack context.
pub const HYBRID_MIN_SUPPORT: usize = 15;

/// Plane-count inflation applied before dividing across slabs in the hybrid context.
pub const HYBRID_PLANE_FACTOR: f64 = 1.5;

/// Support inflation applied before dividing across slabs in the hybrid context.
pub const HYBRID_SUPPORT_FACTOR: f64 = 3.0;

/// Largest kernel support the kernel constructor may produce.
pub const MAX_KERNEL_SUPPORT: usize = 512;

/// Default kernel oversampling.
pub const DEFAULT_OVERSAMPLING: usize = 16;

/// Default channel group size.
pub const DEFAULT_GROUP_SIZE: u64 = 4;

/// Default guard band (field of view in primary beams).
pub const DEFAULT_GUARD_BAND: f64 = 1.0;

/// Default tolerated amplitude loss from w sampling.
pub const DEFAULT_AMPLITUDE_LOSS: f64 = 0.02;

/// Loop gain handed to the deconvolution workflow.
pub const DECONVOLUTION_GAIN: f64 = 0.1;

/// PSF support handed to the deconvolution workflow.
pub const PSF_SUPPORT: usize = 256;

/// Default worker count for the distributed backend.
pub const DEFAULT_WORKERS: i32 = 4;

/// Default threads per worker.
pub const DEFAULT_THREADS_PER_WORKER: usize = 4;

/// Default per-worker memory ceiling in GiB.
pub const DEFAULT_WORKER_MEMORY_GIB: u64 = 64;

/// Bytes per GiB.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Generic error.
    pub const ERROR_GENERIC: i32 = 1;
    /// Invalid configuration.
    pub const ERROR_CONFIG: i32 = 2;
    /// The worker pool could not be started.
    pub const ERROR_BACKEND: i32 = 3;
    /// A unit of work failed.
    pub const ERROR_TASK: i32 = 4;
    /// The collective weighting barrier failed.
    pub const ERROR_BARRIER: i32 = 5;
}
