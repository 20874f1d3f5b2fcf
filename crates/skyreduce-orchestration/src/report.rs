//! Summary of a completed run.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use skyreduce_core::model::QualityReport;
use skyreduce_core::options::{Mode, Weighting};
use skyreduce_core::partition::Partition;
use skyreduce_core::stage::Stage;
use skyreduce_core::strategy::{Context, ImageGeometry, StrategyConfig};
use skyreduce_exec::{BackendKind, ResidencySummary, TaskStats};

/// Wall time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: f64,
}

impl StageTiming {
    #[must_use]
    pub fn new(stage: Stage, elapsed: Duration) -> Self {
        Self {
            stage,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub source: String,
    pub mode: Mode,
    pub context: Context,
    pub weighting: Weighting,
    pub backend: BackendKind,
    pub workers: usize,
    pub partitions: Vec<Partition>,
    pub geometry: ImageGeometry,
    pub strategy: StrategyConfig,
    /// Exported kernel diagnostic, when one was built and exported.
    pub kernel_artifact: Option<PathBuf>,
    /// Exported final image.
    pub artifact: PathBuf,
    pub quality: QualityReport,
    pub major_cycles: usize,
    /// Time spent forcing the final image.
    pub processing_ms: f64,
    pub stages: Vec<StageTiming>,
    pub tasks: TaskStats,
    /// Residency just before persisted results were released.
    pub residency: ResidencySummary,
}

impl RunReport {
    /// Time recorded for `stage`, if the run passed through it.
    #[must_use]
    pub fn stage_ms(&self, stage: Stage) -> Option<f64> {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.elapsed_ms)
    }

    /// Stages the run passed through, in order.
    #[must_use]
    pub fn stage_path(&self) -> Vec<Stage> {
        self.stages.iter().map(|t| t.stage).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_in_millis() {
        let t = StageTiming::new(Stage::Advising, Duration::from_micros(2500));
        assert!((t.elapsed_ms - 2.5).abs() < 1e-9);
    }
}
