//! Application configuration from CLI flags and environment.

use std::path::PathBuf;

use clap::Parser;

use skyreduce_core::constants::{
    DEFAULT_AMPLITUDE_LOSS, DEFAULT_GROUP_SIZE, DEFAULT_GUARD_BAND, DEFAULT_OVERSAMPLING,
    DEFAULT_THREADS_PER_WORKER, DEFAULT_WORKERS, DEFAULT_WORKER_MEMORY_GIB, GIB,
};
use skyreduce_core::error::PipelineError;
use skyreduce_core::options::{CoalescePolicy, DeconvolutionControls, IngestOptions};
use skyreduce_core::strategy::{Context, Overrides};
use skyreduce_exec::BackendConfig;
use skyreduce_orchestration::PipelineConfig;

/// SkyReduce: continuum imaging of a channel range, partitioned across workers.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "skyreduce",
    version,
    about,
    allow_negative_numbers = true,
    args_override_self = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppConfig {
    /// Imaging context: 2d, wprojection, wstack or wprojectwstack.
    #[arg(long, default_value = "2d")]
    pub context: String,

    /// Reject unknown imaging contexts instead of falling back to 2d.
    #[arg(long)]
    pub strict_context: bool,

    /// Imaging mode: pipeline or invert.
    #[arg(long, default_value = "pipeline")]
    pub mode: String,

    /// Measurement set to process.
    #[arg(long, default_value = "../data/EoR0_20deg_24.MS", env = "SKYREDUCE_SOURCE")]
    pub msname: String,

    /// Parent of the per-worker scratch directories.
    #[arg(long)]
    pub local_directory: Option<PathBuf>,

    /// Inclusive channel range to process. The last occurrence wins.
    #[arg(
        long,
        num_args = 2,
        value_names = ["LO", "HI"],
        default_values_t = [0, 160],
        action = clap::ArgAction::Set
    )]
    pub channels: Vec<u64>,

    /// Channels per partition.
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
    pub ngroup: u64,

    /// Process only the first partition.
    #[arg(long, num_args = 0..=1, default_value = "false", default_missing_value = "true", value_parser = parse_switch)]
    pub single: bool,

    /// Number of spectral moments.
    #[arg(long, default_value_t = 1)]
    pub nmoment: usize,

    /// Time coalescing threshold in seconds.
    #[arg(long, default_value_t = 0.0)]
    pub time_coal: f64,

    /// Frequency coalescing threshold in Hz.
    #[arg(long, default_value_t = 0.0)]
    pub frequency_coal: f64,

    /// Image size in pixels.
    #[arg(long)]
    pub npixel: Option<usize>,

    /// Field of view in primary beams.
    #[arg(long, default_value_t = DEFAULT_GUARD_BAND)]
    pub fov: f64,

    /// Pixel size in radians.
    #[arg(long)]
    pub cellsize: Option<f64>,

    /// Step in w, in wavelengths.
    #[arg(long)]
    pub wstep: Option<f64>,

    /// Number of w planes.
    #[arg(long)]
    pub nwplanes: Option<usize>,

    /// Number of w slabs (wprojectwstack only).
    #[arg(long)]
    pub nwslabs: Option<usize>,

    /// Tolerated amplitude loss from w sampling.
    #[arg(long, default_value_t = DEFAULT_AMPLITUDE_LOSS)]
    pub amplitude_loss: f64,

    /// Number of facets in imaging.
    #[arg(long, default_value_t = 1)]
    pub facets: usize,

    /// Oversampling of the w projection kernel.
    #[arg(long, default_value_t = DEFAULT_OVERSAMPLING)]
    pub oversampling: usize,

    /// Weighting scheme: natural or uniform.
    #[arg(long, default_value = "natural")]
    pub weighting: String,

    /// Maximum number of major cycles.
    #[arg(long, default_value_t = 1)]
    pub nmajor: usize,

    /// Minor-cycle iterations per major cycle.
    #[arg(long, default_value_t = 1)]
    pub niter: usize,

    /// Stop when the residual falls below this fraction of the initial peak.
    #[arg(long, default_value_t = 0.2)]
    pub fractional_threshold: f64,

    /// Stop when the residual peak falls below this value.
    #[arg(long, default_value_t = 0.01)]
    pub threshold: f64,

    /// Deconvolution window shape.
    #[arg(long)]
    pub window_shape: Option<String>,

    /// Deconvolution window edge in pixels.
    #[arg(long)]
    pub window_edge: Option<usize>,

    /// Number of facets in restore.
    #[arg(long, default_value_t = 1)]
    pub restore_facets: usize,

    /// Number of facets in deconvolution.
    #[arg(long, default_value_t = 1)]
    pub deconvolve_facets: usize,

    /// Facet overlap in deconvolution, in pixels.
    #[arg(long, default_value_t = 128)]
    pub deconvolve_overlap: usize,

    /// Facet taper in deconvolution.
    #[arg(long, default_value = "tukey")]
    pub deconvolve_taper: String,

    /// Run every task in the calling thread.
    #[arg(long, num_args = 0..=1, default_value = "false", default_missing_value = "true", value_parser = parse_switch)]
    pub serial: bool,

    /// Number of workers; zero or negative sizes the pool from the host.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "SKYREDUCE_NWORKERS")]
    pub nworkers: i32,

    /// Threads per worker.
    #[arg(long, default_value_t = DEFAULT_THREADS_PER_WORKER)]
    pub threads_per_worker: usize,

    /// Memory per worker in GiB; 0 disables the ceiling.
    #[arg(long, default_value_t = DEFAULT_WORKER_MEMORY_GIB)]
    pub memory: u64,

    /// Invert partitions serially inside the imaging workflow.
    #[arg(long, num_args = 0..=1, default_value = "false", default_missing_value = "true", value_parser = parse_switch)]
    pub use_serial_invert: bool,

    /// Predict partitions serially inside the imaging workflow.
    #[arg(long, num_args = 0..=1, default_value = "false", default_missing_value = "true", value_parser = parse_switch)]
    pub use_serial_predict: bool,

    /// Directory the exported images are written to.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Skip exporting the kernel diagnostic image.
    #[arg(long)]
    pub no_kernel_export: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Print only the artifact path.
    #[arg(short, long)]
    pub quiet: bool,

    /// Log stage progress at info level and print stage timings.
    #[arg(short, long)]
    pub verbose: bool,

    /// Generate shell completion.
    #[arg(long, value_enum)]
    pub completion: Option<clap_complete::Shell>,
}

impl AppConfig {
    /// Parse CLI arguments.
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Pipeline configuration described by the flags.
    pub fn pipeline(&self) -> Result<PipelineConfig, PipelineError> {
        let &[lo, hi] = self.channels.as_slice() else {
            return Err(PipelineError::Config(format!(
                "--channels takes two values, got {}",
                self.channels.len()
            )));
        };
        Ok(PipelineConfig {
            source: self.msname.clone(),
            channels: (lo, hi),
            group_size: self.ngroup,
            single: self.single,
            context: Context::parse(&self.context, self.strict_context)?,
            mode: self.mode.parse()?,
            weighting: self.weighting.parse()?,
            ingest: IngestOptions {
                coalesce: CoalescePolicy::from_thresholds(self.time_coal, self.frequency_coal),
                guard_band: self.fov,
                amplitude_loss: self.amplitude_loss,
            },
            overrides: Overrides {
                npixel: self.npixel,
                cellsize: self.cellsize,
                wstep: self.wstep,
                nwplanes: self.nwplanes,
                nwslabs: self.nwslabs,
            },
            oversampling: self.oversampling,
            controls: self.controls(),
            output_dir: self.output_dir.clone(),
            export_kernel: !self.no_kernel_export,
            ..PipelineConfig::default()
        })
    }

    /// Deconvolution controls. A serial run also inverts and predicts serially.
    #[must_use]
    pub fn controls(&self) -> DeconvolutionControls {
        DeconvolutionControls {
            nmajor: self.nmajor,
            niter: self.niter,
            fractional_threshold: self.fractional_threshold,
            threshold: self.threshold,
            nmoment: self.nmoment,
            facets: self.facets,
            restore_facets: self.restore_facets,
            deconvolve_facets: self.deconvolve_facets,
            deconvolve_overlap: self.deconvolve_overlap,
            deconvolve_taper: self.deconvolve_taper.clone(),
            window_shape: self.window_shape.clone(),
            window_edge: self.window_edge,
            use_serial_invert: self.use_serial_invert || self.serial,
            use_serial_predict: self.use_serial_predict || self.serial,
            ..DeconvolutionControls::default()
        }
    }

    /// Backend configuration described by the flags.
    #[must_use]
    pub fn backend(&self) -> BackendConfig {
        let defaults = BackendConfig::default();
        BackendConfig {
            serial: self.serial,
            nworkers: self.nworkers,
            threads_per_worker: self.threads_per_worker,
            memory_per_worker: (self.memory > 0).then(|| self.memory.saturating_mul(GIB)),
            local_directory: self
                .local_directory
                .clone()
                .unwrap_or(defaults.local_directory),
        }
    }
}

/// Accept `true`/`false` in the spellings scripts commonly pass.
fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected true or false, got '{other}'")),
    }
}
