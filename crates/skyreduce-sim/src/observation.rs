//! Synthetic observation and the reader that serves channel slices of it.
//!
//! The same source name always yields the same array layout, and the same
//! channel slice always yields the same samples, so runs are reproducible.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use skyreduce_core::collaborators::DatasetReader;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{BlockRow, RawDataset};
use skyreduce_core::partition::Partition;

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

const EARTH_ROTATION_RATE: f64 = 7.292_115e-5;

/// A point source at direction cosines (`l`, `m`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSource {
    pub flux: f64,
    pub l: f64,
    pub m: f64,
}

/// Shape of the simulated observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimObservation {
    /// Channels available in every source.
    pub nchannels: u64,
    /// Frequency of channel 0 in Hz.
    pub start_frequency: f64,
    /// Channel width in Hz.
    pub channel_width: f64,
    pub nantennas: usize,
    /// Time samples per baseline.
    pub ntimes: usize,
    /// Integration time in seconds.
    pub integration: f64,
    /// Largest antenna distance from the array centre in metres.
    pub array_radius: f64,
    /// Largest antenna height offset in metres.
    pub height_spread: f64,
    /// Thermal noise per sample.
    pub noise: f64,
    pub sky: Vec<PointSource>,
}

impl Default for SimObservation {
    fn default() -> Self {
        Self {
            nchannels: 1024,
            start_frequency: 1.0e8,
            channel_width: 1.0e5,
            nantennas: 6,
            ntimes: 8,
            integration: 4.0,
            array_radius: 500.0,
            height_spread: 20.0,
            noise: 0.01,
            sky: vec![
                PointSource {
                    flux: 1.0,
                    l: 0.0,
                    m: 0.0,
                },
                PointSource {
                    flux: 0.5,
                    l: 0.012,
                    m: -0.006,
                },
            ],
        }
    }
}

impl SimObservation {
    /// Frequency of `channel` in Hz.
    #[must_use]
    pub fn frequency(&self, channel: u64) -> f64 {
        self.start_frequency + self.channel_width * channel as f64
    }

    /// Antenna positions in metres, fixed per source.
    fn antennas(&self, source: &str) -> Vec<[f64; 3]> {
        let mut rng = StdRng::seed_from_u64(seed(&[source.as_bytes(), b"layout"]));
        (0..self.nantennas)
            .map(|_| {
                let radius = self.array_radius * rng.random::<f64>().sqrt();
                let angle = rng.random_range(0.0..2.0 * PI);
                [
                    radius * angle.cos(),
                    radius * angle.sin(),
                    rng.random_range(-self.height_spread..=self.height_spread),
                ]
            })
            .collect()
    }

    fn model_visibility(&self, u: f64, v: f64) -> f64 {
        self.sky
            .iter()
            .map(|s| s.flux * (2.0 * PI * (u * s.l + v * s.m)).cos())
            .sum()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// FNV-1a over the concatenated parts, each followed by a separator byte.
/// Fixed across toolchains, unlike the std hasher.
fn seed(parts: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for byte in part.iter().chain(std::iter::once(&0xff)) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Reader serving channel slices of a [`SimObservation`].
#[derive(Debug, Clone, Default)]
pub struct SimReader {
    observation: SimObservation,
}

impl SimReader {
    #[must_use]
    pub fn new(observation: SimObservation) -> Self {
        Self { observation }
    }
}

impl DatasetReader for SimReader {
    fn read(&self, source: &str, channels: &Partition) -> Result<RawDataset, PipelineError> {
        let obs = &self.observation;
        let fail = |message: String| PipelineError::Read {
            source_name: source.to_string(),
            message,
        };
        if source.is_empty() {
            return Err(fail("empty source name".into()));
        }
        if channels.end >= obs.nchannels {
            return Err(fail(format!(
                "channels {}..={} outside the {} available",
                channels.start, channels.end, obs.nchannels
            )));
        }

        let frequencies: Vec<f64> = (channels.start..=channels.end)
            .map(|c| obs.frequency(c))
            .collect();
        let antennas = obs.antennas(source);
        let mut rng = StdRng::seed_from_u64(seed(&[
            source.as_bytes(),
            &channels.start.to_le_bytes(),
            &channels.end.to_le_bytes(),
        ]));

        let mut rows = Vec::new();
        for t in 0..obs.ntimes {
            let time = t as f64 * obs.integration;
            let (sin_h, cos_h) = (EARTH_ROTATION_RATE * time).sin_cos();
            let mut baseline = 0;
            for (i, a) in antennas.iter().enumerate() {
                for b in &antennas[i + 1..] {
                    let (dx, dy, dz) = (b[0] - a[0], b[1] - a[1], b[2] - a[2]);
                    let uvw = [dx * cos_h - dy * sin_h, dx * sin_h + dy * cos_h, dz];
                    let vis = frequencies
                        .iter()
                        .map(|f| {
                            let scale = f / SPEED_OF_LIGHT;
                            obs.model_visibility(uvw[0] * scale, uvw[1] * scale)
                                + obs.noise * rng.random_range(-1.0..1.0)
                        })
                        .collect();
                    rows.push(BlockRow {
                        baseline,
                        time,
                        integration: obs.integration,
                        uvw,
                        vis,
                        weight: 1.0,
                    });
                    baseline += 1;
                }
            }
        }

        Ok(RawDataset {
            source: source.to_string(),
            partition: *channels,
            frequencies,
            channel_width: obs.channel_width,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_fixed_values() {
        assert_eq!(seed(&[]), FNV_OFFSET);
        // FNV-1a of the single byte 0xff.
        assert_eq!(seed(&[b""]), 0xaf64_724c_8602_eb6e);
        assert_ne!(seed(&[b"a", b"b"]), seed(&[b"ab"]));
    }

    fn part(start: u64, end: u64) -> Partition {
        Partition {
            index: 0,
            start,
            end,
        }
    }

    #[test]
    fn reads_are_deterministic() {
        let reader = SimReader::default();
        let a = reader.read("a.MS", &part(0, 3)).unwrap();
        let b = reader.read("a.MS", &part(0, 3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.frequencies.len(), 4);
        assert_eq!(a.rows.len(), 8 * 15);
        assert_eq!(a.nvis(), 8 * 15 * 4);
    }

    #[test]
    fn layout_is_shared_across_slices() {
        let reader = SimReader::default();
        let a = reader.read("a.MS", &part(0, 3)).unwrap();
        let b = reader.read("a.MS", &part(4, 7)).unwrap();
        assert_eq!(a.rows[5].uvw, b.rows[5].uvw);
        assert_ne!(a.rows[5].vis, b.rows[5].vis);
    }

    #[test]
    fn out_of_band_channels_fail() {
        let reader = SimReader::default();
        let err = reader.read("a.MS", &part(1020, 1024)).unwrap_err();
        assert!(matches!(err, PipelineError::Read { .. }));
        assert!(reader.read("a.MS", &part(1020, 1023)).is_ok());
    }

    #[test]
    fn empty_source_fails() {
        assert!(SimReader::default().read("", &part(0, 0)).is_err());
    }
}
