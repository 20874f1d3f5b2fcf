//! Run configuration consumed by the driver.

use std::path::{Path, PathBuf};

use serde::Serialize;

use skyreduce_core::advisory::AdvisoryPolicy;
use skyreduce_core::constants::{DEFAULT_GROUP_SIZE, DEFAULT_OVERSAMPLING};
use skyreduce_core::error::PipelineError;
use skyreduce_core::options::{DeconvolutionControls, IngestOptions, Mode, Weighting};
use skyreduce_core::partition::{Partition, Partitioner};
use skyreduce_core::strategy::{Context, Overrides};

/// Everything a run needs apart from the backend and collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Source dataset path.
    pub source: String,
    /// Inclusive channel range.
    pub channels: (u64, u64),
    pub group_size: u64,
    /// Process only the first partition.
    pub single: bool,
    pub context: Context,
    pub mode: Mode,
    pub weighting: Weighting,
    pub ingest: IngestOptions,
    pub overrides: Overrides,
    pub policy: AdvisoryPolicy,
    pub oversampling: usize,
    pub controls: DeconvolutionControls,
    /// Directory exported artifacts are written to.
    pub output_dir: PathBuf,
    /// Export the kernel diagnostic image when a kernel is built.
    pub export_kernel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: "../data/EoR0_20deg_24.MS".into(),
            channels: (0, 160),
            group_size: DEFAULT_GROUP_SIZE,
            single: false,
            context: Context::TwoD,
            mode: Mode::Pipeline,
            weighting: Weighting::Natural,
            ingest: IngestOptions::default(),
            overrides: Overrides::default(),
            policy: AdvisoryPolicy::default(),
            oversampling: DEFAULT_OVERSAMPLING,
            controls: DeconvolutionControls::default(),
            output_dir: PathBuf::from("."),
            export_kernel: true,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn partitioner(&self) -> Partitioner {
        Partitioner::new(self.group_size).single(self.single)
    }

    /// Check everything that can be checked before any work is submitted,
    /// returning the partition plan.
    pub fn validate(&self) -> Result<Vec<Partition>, PipelineError> {
        let partitions = self
            .partitioner()
            .plan(self.channels.0, self.channels.1)?;
        self.overrides.validate()?;
        if self.oversampling == 0 {
            return Err(PipelineError::Config("oversampling must be positive".into()));
        }
        if self.context == Context::HybridWProjectWStack && self.overrides.nwslabs.is_none() {
            return Err(PipelineError::Config(
                "wprojectwstack requires --nwslabs".into(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(PipelineError::Config("no source given".into()));
        }
        Ok(partitions)
    }

    /// Source file name with any measurement-set suffix removed.
    #[must_use]
    pub fn artifact_stem(&self) -> String {
        let name = Path::new(&self.source)
            .file_name()
            .map_or_else(|| self.source.clone(), |n| n.to_string_lossy().into_owned());
        let stem = name
            .strip_suffix(".MS")
            .or_else(|| name.strip_suffix(".ms"))
            .unwrap_or(&name);
        if stem.is_empty() {
            "image".to_string()
        } else {
            stem.to_string()
        }
    }

    /// Where the final image is exported.
    #[must_use]
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}",
            self.artifact_stem(),
            self.mode.artifact_suffix()
        ))
    }

    /// Where the kernel diagnostic image is exported.
    #[must_use]
    pub fn kernel_path(&self) -> PathBuf {
        self.output_dir.join("cf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plans_forty_partitions() {
        let parts = PipelineConfig::default().validate().unwrap();
        assert_eq!(parts.len(), 41);
        assert_eq!((parts[40].start, parts[40].end), (160, 160));
    }

    #[test]
    fn artifact_names_follow_source() {
        let mut cfg = PipelineConfig {
            source: "/data/obs/EoR0_20deg_96.MS".into(),
            output_dir: PathBuf::from("out"),
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.artifact_stem(), "EoR0_20deg_96");
        assert_eq!(cfg.artifact_path(), PathBuf::from("out/EoR0_20deg_96_restored"));
        cfg.mode = Mode::Invert;
        cfg.source = "gleam.ms".into();
        assert_eq!(cfg.artifact_path(), PathBuf::from("out/gleam_dirty"));
        assert_eq!(cfg.kernel_path(), PathBuf::from("out/cf"));
    }

    #[test]
    fn hybrid_without_slabs_is_rejected() {
        let cfg = PipelineConfig {
            context: Context::HybridWProjectWStack,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let cfg = PipelineConfig {
            channels: (8, 2),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PipelineError::InvalidRange { lo: 8, hi: 2, .. })
        ));
    }
}
