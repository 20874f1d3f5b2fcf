//! Imaging strategy selection.
//!
//! Exactly one `Context` is active per run. The selector turns the context,
//! the partition advisories and any caller overrides into the frozen
//! `StrategyConfig` and `ImageGeometry` that every later stage reads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::advisory::{Advisory, AdvisoryPolicy};
use crate::constants::{
    HYBRID_MIN_SUPPORT, HYBRID_PLANE_FACTOR, HYBRID_SUPPORT_FACTOR, TWO_D_WSTEP, WSTEP_MARGIN,
};
use crate::error::PipelineError;

/// How the third (w) imaging dimension is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Context {
    /// Ignore w entirely.
    TwoD,
    /// Correct w with a per-visibility convolution kernel.
    WProjection,
    /// Correct w by stacking into discrete planes.
    WStack,
    /// Stack into slabs and project within each slab.
    HybridWProjectWStack,
}

impl Context {
    /// All contexts, in documentation order.
    pub const ALL: [Context; 4] = [
        Context::TwoD,
        Context::WProjection,
        Context::WStack,
        Context::HybridWProjectWStack,
    ];

    /// Command-line name of the context.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::WProjection => "wprojection",
            Self::WStack => "wstack",
            Self::HybridWProjectWStack => "wprojectwstack",
        }
    }

    /// Parse a context name.
    ///
    /// With `strict` unset an unrecognized name falls back to `2d` and a
    /// warning is logged.
    pub fn parse(name: &str, strict: bool) -> Result<Self, PipelineError> {
        match name.parse::<Self>() {
            Ok(context) => Ok(context),
            Err(e) if strict => Err(e),
            Err(_) => {
                tracing::warn!(context = name, "unrecognized imaging context, using 2d");
                Ok(Self::TwoD)
            }
        }
    }

    /// Whether the context grids through a convolution kernel.
    #[must_use]
    pub fn needs_kernel(self) -> bool {
        matches!(self, Self::WProjection | Self::HybridWProjectWStack)
    }

    /// Context handed to the imaging workflow.
    #[must_use]
    pub fn imaging_context(self) -> ImagingContext {
        match self {
            Self::TwoD | Self::WProjection => ImagingContext::TwoD,
            Self::WStack | Self::HybridWProjectWStack => ImagingContext::WStack,
        }
    }
}

impl FromStr for Context {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| PipelineError::UnknownContext(s.to_string()))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Gridding geometry the imaging workflow runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagingContext {
    TwoD,
    WStack,
}

impl ImagingContext {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::WStack => "wstack",
        }
    }
}

/// Caller-supplied values that take precedence over advisory defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    pub npixel: Option<usize>,
    pub cellsize: Option<f64>,
    pub wstep: Option<f64>,
    pub nwplanes: Option<usize>,
    /// Slab count for the hybrid context.
    pub nwslabs: Option<usize>,
}

impl Overrides {
    /// Reject overrides that could never describe an image.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.npixel == Some(0) {
            return Err(PipelineError::Config("npixel must be positive".into()));
        }
        if let Some(cellsize) = self.cellsize {
            if !(cellsize.is_finite() && cellsize > 0.0) {
                return Err(PipelineError::Config(format!(
                    "cellsize must be positive, got {cellsize}"
                )));
            }
        }
        if let Some(wstep) = self.wstep {
            if !(wstep.is_finite() && wstep > 0.0) {
                return Err(PipelineError::Config(format!(
                    "wstep must be positive, got {wstep}"
                )));
            }
        }
        if self.nwplanes == Some(0) {
            return Err(PipelineError::Config("nwplanes must be positive".into()));
        }
        if self.nwslabs == Some(0) {
            return Err(PipelineError::Config("nwslabs must be positive".into()));
        }
        Ok(())
    }
}

/// Image size and pixel scale, frozen once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub npixel: usize,
    pub cellsize: f64,
}

/// Numeric configuration derived for the active context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub context: Context,
    pub imaging_context: ImagingContext,
    pub vis_slices: usize,
    pub support: usize,
    pub wstep: f64,
    pub nwplanes: usize,
    pub oversampling: usize,
}

impl StrategyConfig {
    /// Derive the configuration for `context`.
    ///
    /// `nwplanes` and `wstep` are the already-resolved global values,
    /// `advisory_support` the advisory kernel half-width, and `nwslabs` the
    /// configured slab count (required by the hybrid context only).
    pub fn derive(
        context: Context,
        nwplanes: usize,
        wstep: f64,
        advisory_support: usize,
        nwslabs: Option<usize>,
        oversampling: usize,
    ) -> Result<Self, PipelineError> {
        let base = Self {
            context,
            imaging_context: context.imaging_context(),
            vis_slices: 1,
            support: 1,
            wstep,
            nwplanes,
            oversampling,
        };

        let config = match context {
            Context::TwoD => Self {
                wstep: TWO_D_WSTEP,
                nwplanes: 1,
                ..base
            },
            Context::WProjection => Self {
                support: advisory_support,
                ..base
            },
            Context::WStack => base,
            Context::HybridWProjectWStack => {
                let slabs = match nwslabs {
                    Some(s) if s >= 1 => s,
                    _ => {
                        return Err(PipelineError::Config(
                            "wprojectwstack requires a positive slab count".into(),
                        ))
                    }
                };
                Self {
                    vis_slices: slabs,
                    support: hybrid_support(advisory_support, slabs),
                    nwplanes: hybrid_planes(nwplanes, slabs),
                    ..base
                }
            }
        };
        Ok(config)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hybrid_support(advisory_support: usize, slabs: usize) -> usize {
    let scaled = (HYBRID_SUPPORT_FACTOR * advisory_support as f64 / slabs as f64).round() as usize;
    scaled.max(HYBRID_MIN_SUPPORT) & !1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hybrid_planes(nwplanes: usize, slabs: usize) -> usize {
    ((HYBRID_PLANE_FACTOR * nwplanes as f64 / slabs as f64).round() as usize).max(1)
}

/// Resolves global imaging parameters from advisories and overrides.
#[derive(Debug, Clone, Copy)]
pub struct StrategySelector {
    policy: AdvisoryPolicy,
    overrides: Overrides,
    oversampling: usize,
}

impl StrategySelector {
    /// Create a selector with the default advisory policy and no overrides.
    #[must_use]
    pub fn new(oversampling: usize) -> Self {
        Self {
            policy: AdvisoryPolicy::default(),
            overrides: Overrides::default(),
            oversampling,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AdvisoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve the image size and pixel scale.
    pub fn resolve_geometry(&self, advisories: &[Advisory]) -> Result<ImageGeometry, PipelineError> {
        self.overrides.validate()?;
        let npixel = match self.overrides.npixel {
            Some(n) => n,
            None => self.policy.npixel.pick(advisories)?.npixels_min,
        };
        let cellsize = match self.overrides.cellsize {
            Some(c) => c,
            None => self.policy.cellsize.pick(advisories)?.cellsize,
        };
        Ok(ImageGeometry { npixel, cellsize })
    }

    /// Resolve the strategy configuration for `context`.
    pub fn resolve(
        &self,
        context: Context,
        advisories: &[Advisory],
    ) -> Result<StrategyConfig, PipelineError> {
        self.overrides.validate()?;
        if self.oversampling == 0 {
            return Err(PipelineError::Config("oversampling must be positive".into()));
        }
        let wstep = match self.overrides.wstep {
            Some(w) => w,
            None => WSTEP_MARGIN * self.policy.wstep.pick(advisories)?.wstep,
        };
        let nwplanes = match self.overrides.nwplanes {
            Some(n) => n,
            None => self.policy.nwplanes.pick(advisories)?.wprojection_planes,
        };
        let support = self.policy.support.pick(advisories)?.nwpixels;

        let config = StrategyConfig::derive(
            context,
            nwplanes,
            wstep,
            support,
            self.overrides.nwslabs,
            self.oversampling,
        )?;
        tracing::info!(
            context = %config.context,
            imaging_context = config.imaging_context.name(),
            vis_slices = config.vis_slices,
            support = config.support,
            wstep = config.wstep,
            nwplanes = config.nwplanes,
            "resolved imaging strategy"
        );
        Ok(config)
    }
}
