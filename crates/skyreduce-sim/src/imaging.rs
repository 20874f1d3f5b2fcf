//! Dirty imaging and a Hogbom-style deconvolution loop.
//!
//! Samples go to their nearest uv cell. When kernels are supplied each
//! sample is spread over a small window using the plane matching its w,
//! weighted by the kernel profile and normalized to the sample weight.

use std::sync::Arc;

use tracing::debug;

use skyreduce_core::collaborators::{ImagingInputs, ImagingWorkflow};
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{ConvolutionKernel, Image, ImagingOutcome};
use skyreduce_core::options::DeconvolutionControls;

use crate::grid::UvGrid;

const MAX_SPREAD: usize = 2;
const CLEAN_BEAM_SIGMA: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimImaging;

impl SimImaging {
    /// Weighted sum of `value` over every sample, normalized by the weights gridded.
    fn image(
        &self,
        inputs: &ImagingInputs<'_>,
        value: impl Fn(f64) -> f64,
    ) -> Result<(Image, f64), PipelineError> {
        let Some(first) = inputs.models.first() else {
            return Err(PipelineError::Collaborator("imaging needs at least one model".into()));
        };
        if inputs.models.iter().any(|m| !m.same_grid(first)) {
            return Err(PipelineError::Collaborator("model grids differ".into()));
        }
        if let Some(kernels) = inputs.kernels {
            if kernels.len() != inputs.datasets.len() {
                return Err(PipelineError::Collaborator(format!(
                    "{} kernels for {} partitions",
                    kernels.len(),
                    inputs.datasets.len()
                )));
            }
        }

        let grid = UvGrid::for_image(first);
        let n = grid.npixel();
        let mut cells = vec![0.0; n * n];
        let mut sum_weights = 0.0;
        for (slot, dataset) in inputs.datasets.iter().enumerate() {
            let kernel = inputs.kernels.map(|k| &k[slot]);
            for row in &dataset.rows {
                let Some((r, c)) = grid.position(row.uvw) else {
                    continue;
                };
                let weighted = row.imaging_weight * value(row.vis);
                match kernel {
                    None => cells[r * n + c] += weighted,
                    Some(k) => spread(&mut cells, n, (r, c), weighted, &taps(k, row.uvw[2])),
                }
                sum_weights += row.imaging_weight;
            }
        }
        if sum_weights <= 0.0 {
            return Err(PipelineError::Collaborator("no visibilities fell on the grid".into()));
        }

        let frequency =
            inputs.models.iter().map(|m| m.frequency).sum::<f64>() / inputs.models.len() as f64;
        let data = grid
            .transform(&cells)
            .into_iter()
            .map(|p| p / sum_weights)
            .collect();
        Ok((
            Image {
                npixel: n,
                cellsize: first.cellsize,
                frequency,
                data,
            },
            sum_weights,
        ))
    }
}

impl ImagingWorkflow for SimImaging {
    fn invert(&self, inputs: ImagingInputs<'_>) -> Result<ImagingOutcome, PipelineError> {
        let (image, sum_weights) = self.image(&inputs, |v| v)?;
        debug!(
            partitions = inputs.datasets.len(),
            context = inputs.strategy.imaging_context.name(),
            sum_weights,
            "inverted"
        );
        Ok(ImagingOutcome {
            image,
            residual: None,
            major_cycles: 0,
            sum_weights,
        })
    }

    fn run(
        &self,
        inputs: ImagingInputs<'_>,
        controls: &DeconvolutionControls,
    ) -> Result<ImagingOutcome, PipelineError> {
        let (mut residual, sum_weights) = self.image(&inputs, |v| v)?;
        let (psf, _) = self.image(&inputs, |_| 1.0)?;

        let stop = controls
            .threshold
            .max(controls.fractional_threshold * peak(&residual).2.abs());
        let mut components = Image::zeros(residual.npixel, residual.cellsize, residual.frequency);
        let mut major_cycles = 0;
        for _ in 0..controls.nmajor {
            major_cycles += 1;
            let converged = minor_cycle(&mut residual, &psf, &mut components, controls, stop);
            debug!(cycle = major_cycles, peak = peak(&residual).2, stop, "major cycle");
            if converged {
                break;
            }
        }

        let mut image = convolve_clean_beam(&components);
        for (p, r) in image.data.iter_mut().zip(&residual.data) {
            *p += r;
        }
        Ok(ImagingOutcome {
            image,
            residual: Some(residual),
            major_cycles,
            sum_weights,
        })
    }
}

/// Kernel taps for a sample at `w`, centred on the nearest cell.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn taps(kernel: &Arc<ConvolutionKernel>, w: f64) -> Vec<f64> {
    let meta = kernel.metadata;
    let centre = (kernel.planes.len() / 2) as i64;
    let offset = if meta.wstep > 0.0 {
        (w / meta.wstep).round() as i64
    } else {
        0
    };
    let last = kernel.planes.len().saturating_sub(1);
    let plane = usize::try_from(centre + offset).map_or(0, |p| p.min(last));
    let Some(profile) = kernel.planes.get(plane) else {
        return vec![1.0];
    };
    let half = meta.support / 2;
    let reach = half.min(MAX_SPREAD);
    (half - reach..=half + reach)
        .map(|i| profile.get(i * meta.oversampling).copied().unwrap_or(0.0))
        .collect()
}

fn spread(cells: &mut [f64], n: usize, (row, col): (usize, usize), value: f64, taps: &[f64]) {
    let norm: f64 = taps.iter().sum::<f64>().powi(2);
    if norm.abs() < f64::EPSILON {
        cells[row * n + col] += value;
        return;
    }
    let reach = taps.len() / 2;
    for (i, a) in taps.iter().enumerate() {
        let Some(r) = (row + i).checked_sub(reach).filter(|r| *r < n) else {
            continue;
        };
        for (j, b) in taps.iter().enumerate() {
            if let Some(c) = (col + j).checked_sub(reach).filter(|c| *c < n) {
                cells[r * n + c] += value * a * b / norm;
            }
        }
    }
}

/// (row, col, value) of the largest-magnitude pixel.
fn peak(image: &Image) -> (usize, usize, f64) {
    let n = image.npixel.max(1);
    image
        .data
        .iter()
        .enumerate()
        .fold((0, 0, 0.0), |best, (i, v)| {
            if v.abs() > best.2.abs() {
                (i / n, i % n, *v)
            } else {
                best
            }
        })
}

/// Subtract up to `niter` scaled PSFs. Returns whether the residual fell below `stop`.
fn minor_cycle(
    residual: &mut Image,
    psf: &Image,
    components: &mut Image,
    controls: &DeconvolutionControls,
    stop: f64,
) -> bool {
    let n = residual.npixel;
    let centre = n / 2;
    for _ in 0..controls.niter {
        let (row, col, value) = peak(residual);
        if value.abs() < stop {
            return true;
        }
        let flux = controls.gain * value;
        components.data[row * n + col] += flux;
        for r in 0..n {
            let Some(pr) = (r + centre).checked_sub(row).filter(|p| *p < n) else {
                continue;
            };
            for c in 0..n {
                if let Some(pc) = (c + centre).checked_sub(col).filter(|p| *p < n) {
                    residual.data[r * n + c] -= flux * psf.data[pr * n + pc];
                }
            }
        }
    }
    peak(residual).2.abs() < stop
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn convolve_clean_beam(components: &Image) -> Image {
    let n = components.npixel;
    let reach = (3.0 * CLEAN_BEAM_SIGMA).ceil() as usize;
    let beam: Vec<f64> = (0..=2 * reach)
        .map(|i| {
            let x = i as f64 - reach as f64;
            (-x * x / (2.0 * CLEAN_BEAM_SIGMA * CLEAN_BEAM_SIGMA)).exp()
        })
        .collect();
    let mut out = Image::zeros(n, components.cellsize, components.frequency);
    for (i, flux) in components.data.iter().enumerate() {
        if *flux == 0.0 {
            continue;
        }
        let (row, col) = (i / n, i % n);
        for (a, ka) in beam.iter().enumerate() {
            let Some(r) = (row + a).checked_sub(reach).filter(|r| *r < n) else {
                continue;
            };
            for (b, kb) in beam.iter().enumerate() {
                if let Some(c) = (col + b).checked_sub(reach).filter(|c| *c < n) {
                    out.data[r * n + c] += flux * ka * kb;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::SimConverter;
    use crate::model::SimKernelConstructor;
    use crate::observation::{PointSource, SimObservation, SimReader};
    use skyreduce_core::collaborators::{DatasetReader, FormatConverter, KernelConstructor};
    use skyreduce_core::model::PartitionedDataset;
    use skyreduce_core::options::KernelParams;
    use skyreduce_core::partition::Partition;
    use skyreduce_core::strategy::{Context, StrategyConfig};

    fn datasets() -> Vec<Arc<PartitionedDataset>> {
        datasets_from(&SimReader::default())
    }

    fn datasets_from(reader: &SimReader) -> Vec<Arc<PartitionedDataset>> {
        (0..2)
            .map(|index| {
                let start = index as u64 * 4;
                let raw = reader
                    .read(
                        "imaging.MS",
                        &Partition {
                            index,
                            start,
                            end: start + 3,
                        },
                    )
                    .unwrap();
                Arc::new(SimConverter.convert(&raw).unwrap())
            })
            .collect()
    }

    fn models(n: usize) -> Vec<Arc<Image>> {
        vec![Arc::new(Image::zeros(32, 1.5e-3, 1e8)); n]
    }

    fn strategy() -> StrategyConfig {
        StrategyConfig::derive(Context::TwoD, 1, 1.0, 1, None, 16).unwrap()
    }

    #[test]
    fn psf_peaks_at_unity() {
        let ds = datasets();
        let ms = models(2);
        let s = strategy();
        let inputs = ImagingInputs {
            datasets: &ds,
            models: &ms,
            kernels: None,
            strategy: &s,
        };
        let (psf, sw) = SimImaging.image(&inputs, |_| 1.0).unwrap();
        assert!((psf.get(16, 16) - 1.0).abs() < 1e-9);
        assert!(sw > 0.0);
    }

    #[test]
    fn invert_of_a_centred_source_peaks_at_the_centre() {
        let reader = SimReader::new(SimObservation {
            sky: vec![PointSource {
                flux: 1.0,
                l: 0.0,
                m: 0.0,
            }],
            ..SimObservation::default()
        });
        let ds = datasets_from(&reader);
        let ms = models(2);
        let s = strategy();
        let outcome = SimImaging
            .invert(ImagingInputs {
                datasets: &ds,
                models: &ms,
                kernels: None,
                strategy: &s,
            })
            .unwrap();
        assert_eq!(outcome.major_cycles, 0);
        assert!(outcome.residual.is_none());
        let (row, col, value) = peak(&outcome.image);
        assert_eq!((row, col), (16, 16));
        assert!((value - 1.0).abs() < 0.05);
    }

    #[test]
    fn run_deconvolves_within_cycle_cap() {
        let ds = datasets();
        let ms = models(2);
        let s = strategy();
        let controls = DeconvolutionControls {
            nmajor: 3,
            niter: 50,
            fractional_threshold: 0.0,
            threshold: 0.0,
            ..DeconvolutionControls::default()
        };
        let inputs = ImagingInputs {
            datasets: &ds,
            models: &ms,
            kernels: None,
            strategy: &s,
        };
        let dirty = SimImaging.invert(inputs).unwrap();
        let outcome = SimImaging.run(inputs, &controls).unwrap();
        assert_eq!(outcome.major_cycles, 3);
        let residual = outcome.residual.unwrap();
        assert!(peak(&residual).2.abs() < peak(&dirty.image).2.abs());
    }

    #[test]
    fn run_stops_once_below_threshold() {
        let ds = datasets();
        let ms = models(2);
        let s = strategy();
        let controls = DeconvolutionControls {
            nmajor: 5,
            niter: 1,
            threshold: 100.0,
            ..DeconvolutionControls::default()
        };
        let outcome = SimImaging
            .run(
                ImagingInputs {
                    datasets: &ds,
                    models: &ms,
                    kernels: None,
                    strategy: &s,
                },
                &controls,
            )
            .unwrap();
        assert_eq!(outcome.major_cycles, 1);
    }

    #[test]
    fn kernels_must_match_partitions() {
        let ds = datasets();
        let ms = models(2);
        let s = strategy();
        let kernel = Arc::new(
            SimKernelConstructor
                .build_kernel(&ms[0], &KernelParams::new(3, 8.0, 4, 7))
                .unwrap(),
        );
        let one = vec![Arc::clone(&kernel)];
        let inputs = ImagingInputs {
            datasets: &ds,
            models: &ms,
            kernels: Some(one.as_slice()),
            strategy: &s,
        };
        assert!(SimImaging.invert(inputs).is_err());

        let two = vec![Arc::clone(&kernel), kernel];
        let outcome = SimImaging
            .invert(ImagingInputs {
                kernels: Some(two.as_slice()),
                ..inputs
            })
            .unwrap();
        assert_eq!(outcome.image.npixel, 32);
    }
}
