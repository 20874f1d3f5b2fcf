//! CLI result presenter.

use skyreduce_core::error::PipelineError;
use skyreduce_orchestration::interfaces::ResultPresenter;
use skyreduce_orchestration::report::RunReport;

use crate::output::{format_bytes, format_millis, format_number, quality_rows, report_json};
use crate::ui;

/// CLI result presenter.
///
/// `quiet` prints only the artifact path, `json` prints the whole report,
/// `verbose` adds per-stage timings and task accounting.
pub struct CLIResultPresenter {
    verbose: bool,
    quiet: bool,
    json: bool,
}

impl CLIResultPresenter {
    #[must_use]
    pub fn new(verbose: bool, quiet: bool, json: bool) -> Self {
        Self {
            verbose,
            quiet,
            json,
        }
    }

    /// Lines printed for `report`, without the JSON and quiet variants.
    #[must_use]
    pub fn render(&self, report: &RunReport) -> Vec<String> {
        let mut lines = vec![ui::header("Run")];
        lines.push(ui::field("source", &report.source));
        lines.push(ui::field("mode", &report.mode.to_string()));
        lines.push(ui::field("context", report.context.name()));
        lines.push(ui::field("weighting", &report.weighting.to_string()));
        lines.push(ui::field(
            "backend",
            &format!("{} ({} workers)", report.backend, report.workers),
        ));
        lines.push(ui::field("partitions", &report.partitions.len().to_string()));
        lines.push(ui::field(
            "image",
            &format!(
                "{} px, cell {:.3e} rad",
                report.geometry.npixel, report.geometry.cellsize
            ),
        ));
        lines.push(ui::field(
            "w planes",
            &format!(
                "{} (wstep {:.3}, support {}, slices {})",
                report.strategy.nwplanes,
                report.strategy.wstep,
                report.strategy.support,
                report.strategy.vis_slices
            ),
        ));
        if report.major_cycles > 0 {
            lines.push(ui::field("major cycles", &report.major_cycles.to_string()));
        }
        lines.push(ui::field("processing", &format_millis(report.processing_ms)));

        lines.push(ui::header("Quality"));
        for (label, value) in quality_rows(&report.quality) {
            lines.push(ui::field(label, &value));
        }

        if self.verbose {
            lines.push(ui::header("Stages"));
            for timing in &report.stages {
                lines.push(ui::field(timing.stage.name(), &format_millis(timing.elapsed_ms)));
            }
            lines.push(ui::field(
                "tasks",
                &format!(
                    "{} submitted, {} completed, {} failed",
                    format_number(report.tasks.submitted),
                    format_number(report.tasks.completed),
                    format_number(report.tasks.failed)
                ),
            ));
            if report.residency.pinned > 0 {
                lines.push(ui::field(
                    "resident",
                    &format!(
                        "{} in {} results",
                        format_bytes(report.residency.resident_bytes),
                        report.residency.pinned
                    ),
                ));
            }
        }

        if let Some(cf) = &report.kernel_artifact {
            lines.push(ui::field("kernel", &cf.display().to_string()));
        }
        lines.push(ui::field("artifact", &report.artifact.display().to_string()));
        lines
    }
}

impl ResultPresenter for CLIResultPresenter {
    fn present_report(&self, report: &RunReport) {
        if self.json {
            match report_json(report) {
                Ok(json) => println!("{json}"),
                Err(e) => ui::print_error(&format!("cannot render report: {e}")),
            }
            return;
        }
        if self.quiet {
            println!("{}", report.artifact.display());
            return;
        }
        for line in self.render(report) {
            println!("{line}");
        }
        ui::print_success("run complete");
    }

    fn present_error(&self, error: &PipelineError) {
        ui::print_error(&error.to_string());
        if self.quiet {
            return;
        }
        if let Some(stage) = error.stage() {
            eprintln!("  stage: {stage}");
        }
        if let Some(partition) = error.partition() {
            eprintln!("  partition: {partition}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use skyreduce_core::model::QualityReport;
    use skyreduce_core::options::{Mode, Weighting};
    use skyreduce_core::partition::Partitioner;
    use skyreduce_core::stage::Stage;
    use skyreduce_core::strategy::{Context, ImageGeometry, StrategyConfig};
    use skyreduce_exec::{BackendKind, ResidencySummary, TaskStats};
    use skyreduce_orchestration::report::StageTiming;

    fn report() -> RunReport {
        RunReport {
            source: "EoR0.MS".into(),
            mode: Mode::Pipeline,
            context: Context::WStack,
            weighting: Weighting::Natural,
            backend: BackendKind::Distributed,
            workers: 4,
            partitions: Partitioner::new(4).plan(0, 7).unwrap(),
            geometry: ImageGeometry {
                npixel: 64,
                cellsize: 1.5e-3,
            },
            strategy: StrategyConfig::derive(Context::WStack, 5, 9.5, 7, None, 16).unwrap(),
            kernel_artifact: None,
            artifact: PathBuf::from("out/EoR0_restored.json"),
            quality: QualityReport {
                shape: (64, 64),
                max: 1.0,
                min: -0.1,
                maxabs: 1.0,
                rms: 0.05,
                sum: 3.0,
                medianabs: 0.01,
            },
            major_cycles: 1,
            processing_ms: 12.0,
            stages: vec![StageTiming::new(Stage::Init, Duration::from_millis(1))],
            tasks: TaskStats {
                submitted: 12,
                completed: 12,
                failed: 0,
            },
            residency: ResidencySummary {
                pinned: 6,
                resident_bytes: 4096,
                ceiling_bytes: None,
            },
        }
    }

    #[test]
    fn render_lists_artifact_last() {
        let lines = CLIResultPresenter::new(false, false, false).render(&report());
        assert!(lines.last().unwrap().contains("EoR0_restored.json"));
        assert!(lines.iter().any(|l| l.contains("wstack")));
        assert!(!lines.iter().any(|l| l.contains("submitted")));
    }

    #[test]
    fn verbose_adds_stage_and_task_lines() {
        let lines = CLIResultPresenter::new(true, false, false).render(&report());
        assert!(lines.iter().any(|l| l.contains("12 submitted")));
        assert!(lines.iter().any(|l| l.contains("4.0 KiB in 6 results")));
    }

    #[test]
    fn presenting_does_not_panic() {
        let r = report();
        CLIResultPresenter::new(false, true, false).present_report(&r);
        CLIResultPresenter::new(false, false, true).present_report(&r);
        CLIResultPresenter::new(false, false, false).present_error(&PipelineError::task(
            "ingest",
            Some(3),
            PipelineError::Collaborator("bad".into()),
        ));
    }
}
