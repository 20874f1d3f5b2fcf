//! Imaging advice from dataset extents.

use std::f64::consts::PI;

use skyreduce_core::advisory::Advisory;
use skyreduce_core::collaborators::AdvisoryEstimator;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::PartitionedDataset;

use crate::observation::SPEED_OF_LIGHT;

const MIN_NPIXEL: usize = 32;
const MAX_NPIXEL: usize = 8192;
const MIN_KERNEL_SUPPORT: usize = 7;
const MAX_KERNEL_SUPPORT: usize = 63;

/// Advisor for an array of identical dishes.
#[derive(Debug, Clone, Copy)]
pub struct SimAdvisor {
    /// Dish diameter in metres.
    pub dish_diameter: f64,
}

impl Default for SimAdvisor {
    fn default() -> Self {
        Self {
            dish_diameter: 35.0,
        }
    }
}

impl AdvisoryEstimator for SimAdvisor {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn advise(
        &self,
        dataset: &PartitionedDataset,
        guard_band: f64,
        amplitude_loss: f64,
    ) -> Result<Advisory, PipelineError> {
        let max_uv = dataset.max_uv();
        let frequency = dataset.centre_frequency();
        if max_uv <= 0.0 || frequency <= 0.0 {
            return Err(PipelineError::Collaborator(format!(
                "partition {} has no baselines to advise on",
                dataset.partition
            )));
        }
        if guard_band <= 0.0 || amplitude_loss <= 0.0 {
            return Err(PipelineError::Collaborator(format!(
                "guard band {guard_band} and amplitude loss {amplitude_loss} must be positive"
            )));
        }

        let wavelength = SPEED_OF_LIGHT / frequency;
        let fov = guard_band * wavelength / self.dish_diameter;
        let cellsize = 1.0 / (2.0 * max_uv);
        let npixels_min = ((fov / cellsize).ceil() as usize)
            .next_power_of_two()
            .clamp(MIN_NPIXEL, MAX_NPIXEL);

        let max_w = dataset.max_w();
        let wstep = (2.0 * amplitude_loss).sqrt() / (PI * fov * fov);
        let wprojection_planes = 1 + 2 * (max_w / wstep).ceil() as usize;
        let nwpixels =
            (2 * (max_w * fov).ceil() as usize + 1).clamp(MIN_KERNEL_SUPPORT, MAX_KERNEL_SUPPORT);

        Ok(Advisory {
            npixels_min,
            cellsize,
            wstep,
            wprojection_planes,
            nwpixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::SimConverter;
    use crate::observation::SimReader;
    use skyreduce_core::collaborators::{DatasetReader, FormatConverter};
    use skyreduce_core::partition::Partition;

    fn dataset(start: u64) -> PartitionedDataset {
        let raw = SimReader::default()
            .read(
                "advise.MS",
                &Partition {
                    index: 0,
                    start,
                    end: start + 3,
                },
            )
            .unwrap();
        SimConverter.convert(&raw).unwrap()
    }

    #[test]
    fn advice_is_modest_for_the_default_array() {
        let a = SimAdvisor::default().advise(&dataset(0), 1.0, 0.02).unwrap();
        assert!(a.npixels_min.is_power_of_two());
        assert!((MIN_NPIXEL..=256).contains(&a.npixels_min));
        assert!(a.cellsize > 0.0);
        assert!(a.wprojection_planes % 2 == 1);
        assert!((MIN_KERNEL_SUPPORT..=MAX_KERNEL_SUPPORT).contains(&a.nwpixels));
    }

    #[test]
    fn higher_frequencies_need_finer_cells() {
        let low = SimAdvisor::default().advise(&dataset(0), 1.0, 0.02).unwrap();
        let high = SimAdvisor::default().advise(&dataset(900), 1.0, 0.02).unwrap();
        assert!(high.cellsize < low.cellsize);
    }

    #[test]
    fn wider_guard_band_grows_the_image() {
        let narrow = SimAdvisor::default().advise(&dataset(0), 1.0, 0.02).unwrap();
        let wide = SimAdvisor::default().advise(&dataset(0), 4.0, 0.02).unwrap();
        assert!(wide.npixels_min > narrow.npixels_min);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let mut ds = dataset(0);
        ds.rows.clear();
        assert!(SimAdvisor::default().advise(&ds, 1.0, 0.02).is_err());
    }
}
