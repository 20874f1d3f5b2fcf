//! Block-to-row conversion and time/frequency averaging.

use std::collections::BTreeMap;

use skyreduce_core::collaborators::FormatConverter;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{PartitionedDataset, RawDataset, Visibility};

use crate::observation::SPEED_OF_LIGHT;

/// Converter that expands every channel into its own row.
///
/// Compression averages rows of the same baseline into time bins of
/// `time_threshold` seconds and merges runs of adjacent channels spanning
/// `frequency_threshold` Hz.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimConverter;

impl FormatConverter for SimConverter {
    fn convert(&self, raw: &RawDataset) -> Result<PartitionedDataset, PipelineError> {
        let rows = raw
            .rows
            .iter()
            .flat_map(|row| {
                raw.frequencies.iter().zip(&row.vis).map(move |(f, vis)| {
                    Visibility {
                        time: row.time,
                        frequency: *f,
                        uvw: wavelengths(row.uvw, *f),
                        vis: *vis,
                        weight: row.weight,
                        imaging_weight: row.weight,
                    }
                })
            })
            .collect();
        Ok(PartitionedDataset {
            partition: raw.partition,
            frequencies: raw.frequencies.clone(),
            rows,
            compressed: false,
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn compress(
        &self,
        raw: &RawDataset,
        time_threshold: f64,
        frequency_threshold: f64,
    ) -> Result<PartitionedDataset, PipelineError> {
        if raw.frequencies.is_empty() {
            return Err(PipelineError::Collaborator(format!(
                "cannot compress partition {} without channels",
                raw.partition
            )));
        }
        let time_bin = raw
            .rows
            .iter()
            .map(|r| r.integration)
            .fold(time_threshold, f64::max)
            .max(f64::MIN_POSITIVE);
        let channels_per_bin = if raw.channel_width > 0.0 {
            ((frequency_threshold / raw.channel_width).floor() as usize).max(1)
        } else {
            1
        };

        let mut bins: BTreeMap<(usize, u64, usize), Accumulator> = BTreeMap::new();
        for row in &raw.rows {
            let slot = (row.time / time_bin).floor() as u64;
            for (channel, (f, vis)) in raw.frequencies.iter().zip(&row.vis).enumerate() {
                bins.entry((row.baseline, slot, channel / channels_per_bin))
                    .or_default()
                    .add(row.time, *f, row.uvw, *vis, row.weight);
            }
        }

        let rows = bins.into_values().filter_map(Accumulator::finish).collect();
        let frequencies = raw
            .frequencies
            .chunks(channels_per_bin)
            .map(|c| c.iter().sum::<f64>() / c.len() as f64)
            .collect();
        Ok(PartitionedDataset {
            partition: raw.partition,
            frequencies,
            rows,
            compressed: true,
        })
    }
}

fn wavelengths(uvw: [f64; 3], frequency: f64) -> [f64; 3] {
    let scale = frequency / SPEED_OF_LIGHT;
    [uvw[0] * scale, uvw[1] * scale, uvw[2] * scale]
}

#[derive(Default)]
struct Accumulator {
    weight: f64,
    time: f64,
    frequency: f64,
    uvw: [f64; 3],
    vis: f64,
}

impl Accumulator {
    fn add(&mut self, time: f64, frequency: f64, uvw: [f64; 3], vis: f64, weight: f64) {
        self.weight += weight;
        self.time += weight * time;
        self.frequency += weight * frequency;
        let uvw = wavelengths(uvw, frequency);
        for (acc, x) in self.uvw.iter_mut().zip(uvw) {
            *acc += weight * x;
        }
        self.vis += weight * vis;
    }

    fn finish(self) -> Option<Visibility> {
        if self.weight <= 0.0 {
            return None;
        }
        let w = self.weight;
        Some(Visibility {
            time: self.time / w,
            frequency: self.frequency / w,
            uvw: self.uvw.map(|x| x / w),
            vis: self.vis / w,
            weight: w,
            imaging_weight: w,
        })
    }
}
