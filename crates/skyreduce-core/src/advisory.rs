//! Per-partition imaging advice and the rule for picking the partition that
//! supplies global defaults.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::Footprint;

/// Metadata-derived recommendation for imaging one partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Smallest image size (pixels per side) that covers the field.
    pub npixels_min: usize,
    /// Pixel size in radians.
    pub cellsize: f64,
    /// Recommended w-step in wavelengths.
    pub wstep: f64,
    /// Recommended number of w planes.
    pub wprojection_planes: usize,
    /// Kernel support in pixels for w projection.
    pub nwpixels: usize,
}

impl Footprint for Advisory {}

/// Which partition's advisory supplies a global default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdvisorySource {
    /// The first partition in order.
    #[default]
    First,
    /// The last partition in order.
    Last,
}

impl AdvisorySource {
    /// Pick the designated advisory from an ordered list.
    pub fn pick(self, advisories: &[Advisory]) -> Result<&Advisory, PipelineError> {
        let picked = match self {
            Self::First => advisories.first(),
            Self::Last => advisories.last(),
        };
        picked.ok_or_else(|| PipelineError::Config("no partition advisories available".into()))
    }
}

/// Per-parameter choice of the advisory that supplies its default.
///
/// The default mirrors the established behaviour: everything comes from the
/// first partition except the cell size, which comes from the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryPolicy {
    pub npixel: AdvisorySource,
    pub cellsize: AdvisorySource,
    pub wstep: AdvisorySource,
    pub nwplanes: AdvisorySource,
    pub support: AdvisorySource,
}

impl Default for AdvisoryPolicy {
    fn default() -> Self {
        Self {
            npixel: AdvisorySource::First,
            cellsize: AdvisorySource::Last,
            wstep: AdvisorySource::First,
            nwplanes: AdvisorySource::First,
            support: AdvisorySource::First,
        }
    }
}

impl AdvisoryPolicy {
    /// Take every default from the same partition.
    #[must_use]
    pub fn uniform(source: AdvisorySource) -> Self {
        Self {
            npixel: source,
            cellsize: source,
            wstep: source,
            nwplanes: source,
            support: source,
        }
    }
}
