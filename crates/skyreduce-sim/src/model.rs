//! Model images and gridding kernels.

use tracing::debug;

use skyreduce_core::collaborators::{KernelConstructor, ModelBuilder};
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{ConvolutionKernel, Image, KernelMetadata, PartitionedDataset};
use skyreduce_core::options::KernelParams;
use skyreduce_core::strategy::ImageGeometry;

/// Builds empty models at the partition's centre frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimModelBuilder;

impl ModelBuilder for SimModelBuilder {
    fn build_model(
        &self,
        dataset: &PartitionedDataset,
        geometry: &ImageGeometry,
    ) -> Result<Image, PipelineError> {
        if geometry.npixel == 0 || geometry.cellsize <= 0.0 {
            return Err(PipelineError::Collaborator(format!(
                "cannot build a {}-pixel model with cell size {}",
                geometry.npixel, geometry.cellsize
            )));
        }
        Ok(Image::zeros(
            geometry.npixel,
            geometry.cellsize,
            dataset.centre_frequency(),
        ))
    }
}

/// Gaussian-tapered kernel with a quadratic w phase per plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimKernelConstructor;

impl KernelConstructor for SimKernelConstructor {
    fn build_kernel(
        &self,
        model: &Image,
        params: &KernelParams,
    ) -> Result<ConvolutionKernel, PipelineError> {
        if params.nwplanes == 0 || params.oversampling == 0 || params.support == 0 {
            return Err(PipelineError::Collaborator(format!(
                "degenerate kernel: {} planes, oversampling {}, support {}",
                params.nwplanes, params.oversampling, params.support
            )));
        }
        let support = params.support.min(params.max_support);
        if support < params.support {
            debug!(requested = params.support, support, "kernel support capped");
        }

        let half = (support / 2) as f64;
        let sigma = (support as f64 / 6.0).max(0.5);
        let oversampling = params.oversampling as f64;
        let centre = (params.nwplanes / 2) as f64;
        let planes = (0..params.nwplanes)
            .map(|p| {
                let w = (p as f64 - centre) * params.wstep;
                (0..support * params.oversampling)
                    .map(|i| {
                        let x = i as f64 / oversampling - half;
                        let taper = (-x * x / (2.0 * sigma * sigma)).exp();
                        let offset = x * model.cellsize;
                        taper * (std::f64::consts::PI * w * offset * offset).cos()
                    })
                    .collect()
            })
            .collect();

        Ok(ConvolutionKernel {
            metadata: KernelMetadata {
                nwplanes: params.nwplanes,
                wstep: params.wstep,
                oversampling: params.oversampling,
                support,
            },
            planes,
        })
    }
}
