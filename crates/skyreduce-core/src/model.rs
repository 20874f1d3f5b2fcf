//! Data exchanged between pipeline stages.
//!
//! These are the payloads carried by deferred tasks. The orchestrator never
//! inspects visibilities or pixels beyond their footprint; the contents are
//! produced and consumed by the collaborators.

use serde::{Deserialize, Serialize};

use crate::partition::Partition;

/// Approximate resident size of a task result, used for worker memory accounting.
pub trait Footprint {
    /// Estimated bytes held by this value.
    fn footprint(&self) -> usize {
        std::mem::size_of_val(self)
    }
}

impl<T: Footprint> Footprint for Vec<T> {
    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>() + self.iter().map(Footprint::footprint).sum::<usize>()
    }
}

impl<T: Footprint> Footprint for std::sync::Arc<T> {
    fn footprint(&self) -> usize {
        T::footprint(self)
    }
}

impl Footprint for f64 {}
impl Footprint for usize {}

/// One time sample of one baseline in block (per-channel) layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    /// Baseline index within the array.
    pub baseline: usize,
    /// Sample time in seconds.
    pub time: f64,
    /// Integration time in seconds.
    pub integration: f64,
    /// Baseline coordinates in metres.
    pub uvw: [f64; 3],
    /// Visibility amplitude per channel.
    pub vis: Vec<f64>,
    /// Sample weight.
    pub weight: f64,
}

/// Dataset as read from the source, before conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    /// Source the rows were read from.
    pub source: String,
    /// Channel slice covered.
    pub partition: Partition,
    /// Channel frequencies in Hz.
    pub frequencies: Vec<f64>,
    /// Channel width in Hz.
    pub channel_width: f64,
    /// Block rows.
    pub rows: Vec<BlockRow>,
}

impl RawDataset {
    /// Total number of visibility samples.
    #[must_use]
    pub fn nvis(&self) -> usize {
        self.rows.len() * self.frequencies.len()
    }
}

impl Footprint for RawDataset {
    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.frequencies.len() * 8
            + self
                .rows
                .iter()
                .map(|r| std::mem::size_of::<BlockRow>() + r.vis.len() * 8)
                .sum::<usize>()
    }
}

/// One visibility sample in row (per-sample) layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    /// Sample time in seconds.
    pub time: f64,
    /// Frequency in Hz.
    pub frequency: f64,
    /// Baseline coordinates in wavelengths.
    pub uvw: [f64; 3],
    /// Visibility amplitude.
    pub vis: f64,
    /// Natural weight.
    pub weight: f64,
    /// Weight used for imaging, after any reweighting.
    pub imaging_weight: f64,
}

/// Converted or compressed dataset for one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedDataset {
    /// Channel slice covered.
    pub partition: Partition,
    /// Channel frequencies in Hz.
    pub frequencies: Vec<f64>,
    /// Visibility rows.
    pub rows: Vec<Visibility>,
    /// Whether the rows were produced by lossy compression.
    pub compressed: bool,
}

impl PartitionedDataset {
    /// Largest |w| in wavelengths.
    #[must_use]
    pub fn max_w(&self) -> f64 {
        self.rows.iter().map(|r| r.uvw[2].abs()).fold(0.0, f64::max)
    }

    /// Largest uv distance in wavelengths.
    #[must_use]
    pub fn max_uv(&self) -> f64 {
        self.rows
            .iter()
            .map(|r| r.uvw[0].hypot(r.uvw[1]))
            .fold(0.0, f64::max)
    }

    /// Mean channel frequency.
    #[must_use]
    pub fn centre_frequency(&self) -> f64 {
        if self.frequencies.is_empty() {
            return 0.0;
        }
        self.frequencies.iter().sum::<f64>() / self.frequencies.len() as f64
    }
}

impl Footprint for PartitionedDataset {
    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.frequencies.len() * 8
            + self.rows.len() * std::mem::size_of::<Visibility>()
    }
}

/// A square single-plane image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Pixels along each axis.
    pub npixel: usize,
    /// Pixel size in radians.
    pub cellsize: f64,
    /// Reference frequency in Hz.
    pub frequency: f64,
    /// Row-major pixel values, `npixel * npixel` long.
    pub data: Vec<f64>,
}

impl Image {
    /// An all-zero image.
    #[must_use]
    pub fn zeros(npixel: usize, cellsize: f64, frequency: f64) -> Self {
        Self {
            npixel,
            cellsize,
            frequency,
            data: vec![0.0; npixel * npixel],
        }
    }

    /// Pixel value at (`row`, `col`).
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.npixel + col]
    }

    /// Whether `other` has the same grid.
    #[must_use]
    pub fn same_grid(&self, other: &Image) -> bool {
        self.npixel == other.npixel && (self.cellsize - other.cellsize).abs() <= f64::EPSILON
    }
}

impl Footprint for Image {
    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>() + self.data.len() * 8
    }
}

/// Parameters a kernel was built with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelMetadata {
    pub nwplanes: usize,
    pub wstep: f64,
    pub oversampling: usize,
    pub support: usize,
}

/// Gridding convolution function, one oversampled profile per w plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvolutionKernel {
    pub metadata: KernelMetadata,
    /// `nwplanes` profiles of `support * oversampling` samples each.
    pub planes: Vec<Vec<f64>>,
}

impl ConvolutionKernel {
    /// Real-valued image of the central plane, sampled at integer pixel offsets.
    #[must_use]
    pub fn to_image(&self, cellsize: f64) -> Image {
        let support = self.metadata.support.max(1);
        let oversampling = self.metadata.oversampling.max(1);
        let mut image = Image::zeros(support, cellsize, 0.0);
        let Some(profile) = self.planes.get(self.planes.len() / 2) else {
            return image;
        };
        let sampled: Vec<f64> = (0..support)
            .map(|i| profile.get(i * oversampling).copied().unwrap_or(0.0))
            .collect();
        for (row, a) in sampled.iter().enumerate() {
            for (col, b) in sampled.iter().enumerate() {
                image.data[row * support + col] = a * b;
            }
        }
        image
    }
}

impl Footprint for ConvolutionKernel {
    fn footprint(&self) -> usize {
        std::mem::size_of::<Self>() + self.planes.iter().map(|p| p.len() * 8).sum::<usize>()
    }
}

/// Summary statistics of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub shape: (usize, usize),
    pub max: f64,
    pub min: f64,
    pub maxabs: f64,
    pub rms: f64,
    pub sum: f64,
    pub medianabs: f64,
}

/// Products of the imaging workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingOutcome {
    /// Restored image in pipeline mode, dirty image in invert mode.
    pub image: Image,
    /// Final residual, when deconvolution ran.
    pub residual: Option<Image>,
    /// Major cycles actually performed.
    pub major_cycles: usize,
    /// Sum of imaging weights gridded.
    pub sum_weights: f64,
}

impl Footprint for ImagingOutcome {
    fn footprint(&self) -> usize {
        self.image.footprint() + self.residual.as_ref().map_or(0, Footprint::footprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: Vec<Visibility>) -> PartitionedDataset {
        PartitionedDataset {
            partition: Partition {
                index: 0,
                start: 0,
                end: 1,
            },
            frequencies: vec![1.0e8, 1.2e8],
            rows,
            compressed: false,
        }
    }

    fn row(u: f64, v: f64, w: f64) -> Visibility {
        Visibility {
            time: 0.0,
            frequency: 1.0e8,
            uvw: [u, v, w],
            vis: 1.0,
            weight: 1.0,
            imaging_weight: 1.0,
        }
    }

    #[test]
    fn dataset_extents() {
        let ds = dataset(vec![row(3.0, 4.0, -7.0), row(1.0, 0.0, 2.0)]);
        assert!((ds.max_uv() - 5.0).abs() < 1e-12);
        assert!((ds.max_w() - 7.0).abs() < 1e-12);
        assert!((ds.centre_frequency() - 1.1e8).abs() < 1.0);
    }

    #[test]
    fn footprint_scales_with_rows() {
        let small = dataset(vec![row(0.0, 0.0, 0.0)]);
        let large = dataset(vec![row(0.0, 0.0, 0.0); 100]);
        assert!(large.footprint() > small.footprint());
        assert!(large.footprint() >= 100 * std::mem::size_of::<Visibility>());
    }

    #[test]
    fn zeros_image_has_full_grid() {
        let img = Image::zeros(8, 1e-4, 1e8);
        assert_eq!(img.data.len(), 64);
        assert_eq!(img.footprint(), std::mem::size_of::<Image>() + 64 * 8);
        assert!(img.same_grid(&Image::zeros(8, 1e-4, 2e8)));
        assert!(!img.same_grid(&Image::zeros(16, 1e-4, 1e8)));
    }

    #[test]
    fn kernel_image_is_outer_product_of_central_plane() {
        let kernel = ConvolutionKernel {
            metadata: KernelMetadata {
                nwplanes: 1,
                wstep: 1.0,
                oversampling: 2,
                support: 3,
            },
            planes: vec![vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0]],
        };
        let img = kernel.to_image(1e-3);
        assert_eq!(img.npixel, 3);
        assert!((img.get(1, 2) - 6.0).abs() < 1e-12);
        assert!((img.get(2, 2) - 9.0).abs() < 1e-12);
    }
}
