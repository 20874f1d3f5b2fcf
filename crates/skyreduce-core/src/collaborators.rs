//! Contracts of the external collaborators the orchestrator invokes.
//!
//! The orchestrator treats every implementation as opaque: it schedules the
//! calls, threads results between them, and waits on them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::advisory::Advisory;
use crate::error::PipelineError;
use crate::model::{ConvolutionKernel, Image, ImagingOutcome, PartitionedDataset, QualityReport, RawDataset};
use crate::options::{DeconvolutionControls, KernelParams};
use crate::partition::Partition;
use crate::strategy::{ImageGeometry, StrategyConfig};

/// Reads one channel slice of a source.
pub trait DatasetReader: Send + Sync {
    fn read(&self, source: &str, channels: &Partition) -> Result<RawDataset, PipelineError>;
}

/// Converts block data to row data, optionally with lossy compression.
pub trait FormatConverter: Send + Sync {
    fn convert(&self, raw: &RawDataset) -> Result<PartitionedDataset, PipelineError>;

    fn compress(
        &self,
        raw: &RawDataset,
        time_threshold: f64,
        frequency_threshold: f64,
    ) -> Result<PartitionedDataset, PipelineError>;
}

/// Derives imaging advice from a dataset's metadata.
pub trait AdvisoryEstimator: Send + Sync {
    fn advise(
        &self,
        dataset: &PartitionedDataset,
        guard_band: f64,
        amplitude_loss: f64,
    ) -> Result<Advisory, PipelineError>;
}

/// Builds an empty model image for a dataset.
pub trait ModelBuilder: Send + Sync {
    fn build_model(
        &self,
        dataset: &PartitionedDataset,
        geometry: &ImageGeometry,
    ) -> Result<Image, PipelineError>;
}

/// Builds the gridding kernel for a model.
pub trait KernelConstructor: Send + Sync {
    fn build_kernel(
        &self,
        model: &Image,
        params: &KernelParams,
    ) -> Result<ConvolutionKernel, PipelineError>;
}

/// Reweights every partition's visibilities at once.
pub trait Weighter: Send + Sync {
    fn weight(
        &self,
        datasets: &[Arc<PartitionedDataset>],
        models: &[Arc<Image>],
    ) -> Result<Vec<PartitionedDataset>, PipelineError>;
}

/// Everything the imaging workflow reads.
#[derive(Clone, Copy)]
pub struct ImagingInputs<'a> {
    pub datasets: &'a [Arc<PartitionedDataset>],
    pub models: &'a [Arc<Image>],
    pub kernels: Option<&'a [Arc<ConvolutionKernel>]>,
    pub strategy: &'a StrategyConfig,
}

/// Imaging and deconvolution. Iterates major cycles internally.
pub trait ImagingWorkflow: Send + Sync {
    /// Continuum imaging: major cycles until convergence or the cycle cap.
    fn run(
        &self,
        inputs: ImagingInputs<'_>,
        controls: &DeconvolutionControls,
    ) -> Result<ImagingOutcome, PipelineError>;

    /// Dirty image summed over all partitions.
    fn invert(&self, inputs: ImagingInputs<'_>) -> Result<ImagingOutcome, PipelineError>;
}

/// Writes and summarizes images.
pub trait Exporter: Send + Sync {
    /// Write `image` at `path` (an extension may be appended) and return the written path.
    fn export(&self, image: &Image, path: &Path) -> Result<PathBuf, PipelineError>;

    fn summarize(&self, image: &Image) -> QualityReport;
}

/// The set of collaborators a run uses.
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn DatasetReader>,
    pub converter: Arc<dyn FormatConverter>,
    pub advisor: Arc<dyn AdvisoryEstimator>,
    pub models: Arc<dyn ModelBuilder>,
    pub kernels: Arc<dyn KernelConstructor>,
    pub weighter: Arc<dyn Weighter>,
    pub imaging: Arc<dyn ImagingWorkflow>,
    pub exporter: Arc<dyn Exporter>,
}
