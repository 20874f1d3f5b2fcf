//! Run options that are passed through the pipeline unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DECONVOLUTION_GAIN, DEFAULT_AMPLITUDE_LOSS, DEFAULT_GUARD_BAND, MAX_KERNEL_SUPPORT,
    PSF_SUPPORT,
};
use crate::error::PipelineError;

/// Visibility weighting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Weighting {
    #[default]
    Natural,
    Uniform,
}

impl Weighting {
    /// Whether weights depend on every partition at once.
    #[must_use]
    pub fn requires_global_normalization(self) -> bool {
        matches!(self, Self::Uniform)
    }
}

impl FromStr for Weighting {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" => Ok(Self::Natural),
            "uniform" => Ok(Self::Uniform),
            other => Err(PipelineError::Config(format!(
                "unknown weighting scheme: {other}"
            ))),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Natural => "natural",
            Self::Uniform => "uniform",
        })
    }
}

/// What the imaging stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Continuum imaging with major cycles; exports the restored image.
    #[default]
    Pipeline,
    /// Dirty image only.
    Invert,
}

impl Mode {
    /// Suffix of the exported artifact.
    #[must_use]
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Self::Pipeline => "restored",
            Self::Invert => "dirty",
        }
    }
}

impl FromStr for Mode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pipeline" => Ok(Self::Pipeline),
            "invert" => Ok(Self::Invert),
            other => Err(PipelineError::Config(format!("unknown mode: {other}"))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pipeline => "pipeline",
            Self::Invert => "invert",
        })
    }
}

/// Per-partition ingest path, decided from the coalescing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoalescePolicy {
    /// Straight format conversion.
    Convert,
    /// Lossy compression with the given thresholds.
    Compress { time: f64, frequency: f64 },
}

impl CoalescePolicy {
    /// Compress only when both thresholds are non-negative and at least one is positive.
    #[must_use]
    pub fn from_thresholds(time: f64, frequency: f64) -> Self {
        if time >= 0.0 && frequency >= 0.0 && (time > 0.0 || frequency > 0.0) {
            Self::Compress { time, frequency }
        } else {
            Self::Convert
        }
    }
}

/// Options consumed by the ingest and advisory tasks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    pub coalesce: CoalescePolicy,
    /// Field of view in primary beams.
    pub guard_band: f64,
    /// Tolerated amplitude loss from w sampling.
    pub amplitude_loss: f64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            coalesce: CoalescePolicy::Convert,
            guard_band: DEFAULT_GUARD_BAND,
            amplitude_loss: DEFAULT_AMPLITUDE_LOSS,
        }
    }
}

/// Kernel construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    pub nwplanes: usize,
    pub wstep: f64,
    pub oversampling: usize,
    pub support: usize,
    pub max_support: usize,
}

impl KernelParams {
    #[must_use]
    pub fn new(nwplanes: usize, wstep: f64, oversampling: usize, support: usize) -> Self {
        Self {
            nwplanes,
            wstep,
            oversampling,
            support,
            max_support: MAX_KERNEL_SUPPORT,
        }
    }
}

/// Iteration limits, convergence thresholds and deconvolution geometry
/// handed to the imaging workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeconvolutionControls {
    pub nmajor: usize,
    pub niter: usize,
    pub gain: f64,
    pub fractional_threshold: f64,
    pub threshold: f64,
    pub nmoment: usize,
    pub facets: usize,
    pub restore_facets: usize,
    pub deconvolve_facets: usize,
    pub deconvolve_overlap: usize,
    pub deconvolve_taper: String,
    pub window_shape: Option<String>,
    pub window_edge: Option<usize>,
    pub psf_support: usize,
    pub use_serial_invert: bool,
    pub use_serial_predict: bool,
}

impl Default for DeconvolutionControls {
    fn default() -> Self {
        Self {
            nmajor: 1,
            niter: 1,
            gain: DECONVOLUTION_GAIN,
            fractional_threshold: 0.2,
            threshold: 0.01,
            nmoment: 1,
            facets: 1,
            restore_facets: 1,
            deconvolve_facets: 1,
            deconvolve_overlap: 128,
            deconvolve_taper: "tukey".into(),
            window_shape: None,
            window_edge: None,
            psf_support: PSF_SUPPORT,
            use_serial_invert: false,
            use_serial_predict: false,
        }
    }
}
