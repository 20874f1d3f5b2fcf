//! The pipeline driver.
//!
//! Runs move through `Init -> Ingesting -> Advising -> [WeightingBarrier]
//! -> [KernelBuild] -> MajorCycleImaging -> Finalizing -> Done`. The driver
//! blocks only where every partition must have reached a stage: the advisory
//! computation, the kernel diagnostic and the final image. A failure anywhere
//! moves the run to `Failed`, releases the backend and is returned with the
//! stage it happened in.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use skyreduce_core::advisory::Advisory;
use skyreduce_core::collaborators::Collaborators;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{ConvolutionKernel, Image, ImagingOutcome, PartitionedDataset};
use skyreduce_core::observer::{StageObserver, StageUpdate};
use skyreduce_core::observers::NoOpObserver;
use skyreduce_core::options::KernelParams;
use skyreduce_core::stage::Stage;
use skyreduce_core::strategy::StrategySelector;
use skyreduce_exec::{connect, BackendConfig, BackendExt, Deferred, ExecutionBackend};

use crate::barrier::apply_weighting;
use crate::config::PipelineConfig;
use crate::report::{RunReport, StageTiming};
use crate::task_graph::TaskGraph;

/// Tracks the current stage, reports transitions and records timings.
struct StageClock<'a> {
    observer: &'a dyn StageObserver,
    current: Stage,
    entered: Instant,
    timings: Vec<StageTiming>,
}

impl<'a> StageClock<'a> {
    fn start(observer: &'a dyn StageObserver) -> Self {
        observer.on_stage(&StageUpdate::entered(Stage::Init, "validating configuration"));
        Self {
            observer,
            current: Stage::Init,
            entered: Instant::now(),
            timings: Vec::new(),
        }
    }

    fn advance(&mut self, next: Stage, detail: impl Into<String>) -> Result<(), PipelineError> {
        if !self.current.can_advance_to(next) {
            return Err(PipelineError::Config(format!(
                "illegal stage transition {} -> {next}",
                self.current
            )));
        }
        let elapsed = self.entered.elapsed();
        self.observer.on_stage(&StageUpdate::finished(
            self.current,
            format!("{} done", self.current),
            elapsed,
        ));
        self.timings.push(StageTiming::new(self.current, elapsed));
        info!(from = %self.current, to = %next, "stage transition");

        self.current = next;
        self.entered = Instant::now();
        self.observer.on_stage(&StageUpdate::entered(next, detail));
        Ok(())
    }
}

/// Handles still pinned on the backend, released when the run ends.
#[derive(Default)]
struct Resident {
    datasets: Vec<Deferred<PartitionedDataset>>,
    models: Vec<Deferred<Image>>,
    kernels: Vec<Deferred<ConvolutionKernel>>,
    outcome: Vec<Deferred<ImagingOutcome>>,
}

impl Resident {
    fn release(&mut self, backend: &dyn ExecutionBackend) {
        backend.release(&std::mem::take(&mut self.datasets));
        backend.release(&std::mem::take(&mut self.models));
        backend.release(&std::mem::take(&mut self.kernels));
        backend.release(&std::mem::take(&mut self.outcome));
    }
}

/// Top-level controller of one reduction run.
pub struct PipelineDriver {
    config: PipelineConfig,
    backend: Arc<dyn ExecutionBackend>,
    collaborators: Collaborators,
    observer: Arc<dyn StageObserver>,
}

impl PipelineDriver {
    /// Create a driver on an already-connected backend.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn ExecutionBackend>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            backend,
            collaborators,
            observer: Arc::new(NoOpObserver::new()),
        }
    }

    /// Validate `config`, then start the backend `backend` describes.
    ///
    /// Configuration errors are reported before any backend is started.
    pub fn connect(
        config: PipelineConfig,
        backend: &BackendConfig,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(|e| e.in_stage(Stage::Init))?;
        let backend = connect(backend).map_err(|e| e.in_stage(Stage::Init))?;
        Ok(Self::new(config, backend, collaborators))
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    /// Run the pipeline to completion.
    ///
    /// The backend is shut down whether the run succeeds or fails.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let mut clock = StageClock::start(self.observer.as_ref());
        let mut resident = Resident::default();
        match self.execute(&mut clock, &mut resident) {
            Ok(report) => Ok(report),
            Err(e) => {
                let err = e.in_stage(clock.current);
                error!(
                    stage = %clock.current,
                    partition = ?err.partition(),
                    "run failed: {err}"
                );
                resident.release(self.backend.as_ref());
                if let Err(shutdown) = self.backend.shutdown() {
                    warn!("backend shutdown after failure: {shutdown}");
                }
                let _ = clock.advance(Stage::Failed, err.to_string());
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        clock: &mut StageClock<'_>,
        resident: &mut Resident,
    ) -> Result<RunReport, PipelineError> {
        let cfg = &self.config;
        let backend = self.backend.as_ref();
        let partitions = cfg.validate()?;
        info!(
            source = %cfg.source,
            partitions = partitions.len(),
            backend = %backend.kind(),
            workers = backend.workers(),
            mode = %cfg.mode,
            context = %cfg.context,
            "run configured"
        );
        let graph = TaskGraph::new(
            Arc::clone(&self.backend),
            self.collaborators.clone(),
            cfg.ingest,
        );

        clock.advance(
            Stage::Ingesting,
            format!("reading {} partitions", partitions.len()),
        )?;
        resident.datasets = backend.persist(&graph.build_ingest_all(&partitions, &cfg.source));

        clock.advance(Stage::Advising, "advising on imaging parameters")?;
        let advice: Vec<Deferred<Advisory>> = resident
            .datasets
            .iter()
            .map(|d| graph.build_advice(d))
            .collect();
        let advisories: Vec<Advisory> = backend.compute(&advice)?.iter().map(|a| **a).collect();
        let selector = StrategySelector::new(cfg.oversampling)
            .with_policy(cfg.policy)
            .with_overrides(cfg.overrides);
        let geometry = selector.resolve_geometry(&advisories)?;
        let strategy = selector.resolve(cfg.context, &advisories)?;
        info!(
            npixel = geometry.npixel,
            cellsize = geometry.cellsize,
            "image geometry resolved"
        );
        let models: Vec<Deferred<Image>> = resident
            .datasets
            .iter()
            .map(|d| graph.build_model(d, geometry))
            .collect();
        resident.models = backend.persist(&models);

        if cfg.weighting.requires_global_normalization() {
            clock.advance(
                Stage::WeightingBarrier,
                format!("{} weighting over all partitions", cfg.weighting),
            )?;
            let unweighted = resident.datasets.clone();
            let weighted = apply_weighting(&graph, cfg.weighting, unweighted.clone(), &resident.models);
            resident.datasets = backend.persist(&weighted);
            backend.release(&unweighted);
        }

        let mut kernel_artifact = None;
        if cfg.context.needs_kernel() {
            clock.advance(Stage::KernelBuild, "building gridding kernels")?;
            let params = KernelParams::new(
                strategy.nwplanes,
                strategy.wstep,
                strategy.oversampling,
                strategy.support,
            );
            let kernels: Vec<_> = resident
                .models
                .iter()
                .map(|m| graph.build_kernel(m, params))
                .collect();
            resident.kernels = backend.persist(&kernels);
            if let Some(first) = resident.kernels.first() {
                let kernel = backend.compute(std::slice::from_ref(first))?;
                if cfg.export_kernel {
                    kernel_artifact = Some(self.export_kernel(&kernel[0], geometry.cellsize)?);
                }
            }
        }

        clock.advance(Stage::MajorCycleImaging, format!("{} over all partitions", cfg.mode))?;
        let kernels = (!resident.kernels.is_empty()).then_some(resident.kernels.as_slice());
        let outcome = graph.build_imaging(
            cfg.mode,
            &resident.datasets,
            &resident.models,
            kernels,
            strategy,
            cfg.controls.clone(),
        );
        resident.outcome = backend.persist(std::slice::from_ref(&outcome));

        clock.advance(Stage::Finalizing, "computing the final image")?;
        let started = Instant::now();
        let outcome = backend
            .compute(&resident.outcome)?
            .pop()
            .ok_or_else(|| PipelineError::Collaborator("imaging produced no result".into()))?;
        let processing = started.elapsed();
        info!(
            processing_ms = processing.as_secs_f64() * 1000.0,
            major_cycles = outcome.major_cycles,
            "processing finished"
        );

        let exporter = &self.collaborators.exporter;
        let quality = exporter.summarize(&outcome.image);
        let artifact = exporter.export(&outcome.image, &cfg.artifact_path())?;
        info!(artifact = %artifact.display(), "wrote {} image", cfg.mode.artifact_suffix());

        let residency = backend.residency_summary();
        resident.release(backend);
        let tasks = backend.task_stats();
        backend.shutdown()?;
        clock.advance(Stage::Done, "run complete")?;

        Ok(RunReport {
            source: cfg.source.clone(),
            mode: cfg.mode,
            context: cfg.context,
            weighting: cfg.weighting,
            backend: backend.kind(),
            workers: backend.workers(),
            partitions,
            geometry,
            strategy,
            kernel_artifact,
            artifact,
            quality,
            major_cycles: outcome.major_cycles,
            processing_ms: processing.as_secs_f64() * 1000.0,
            stages: clock.timings.clone(),
            tasks,
            residency,
        })
    }

    fn export_kernel(&self, kernel: &ConvolutionKernel, cellsize: f64) -> Result<PathBuf, PipelineError> {
        let image = kernel.to_image(cellsize);
        let path = self
            .collaborators
            .exporter
            .export(&image, &self.config.kernel_path())?;
        info!(path = %path.display(), support = kernel.metadata.support, "exported kernel diagnostic");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use skyreduce_core::observers::ChannelObserver;
    use skyreduce_core::options::{Mode, Weighting};
    use skyreduce_core::strategy::{Context, Overrides};
    use skyreduce_exec::LocalBackend;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            source: "/data/sim_8.MS".into(),
            channels: (0, 7),
            group_size: 4,
            output_dir: dir.to_path_buf(),
            overrides: Overrides {
                npixel: Some(32),
                ..Overrides::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn driver(cfg: PipelineConfig) -> PipelineDriver {
        PipelineDriver::new(cfg, Arc::new(LocalBackend::new()), skyreduce_sim::collaborators())
    }

    #[test]
    fn two_d_pipeline_runs_to_done() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, rx) = unbounded();
        let report = driver(config(tmp.path()))
            .with_observer(Arc::new(ChannelObserver::new(tx)))
            .run()
            .unwrap();

        assert_eq!(report.partitions.len(), 2);
        assert_eq!(report.strategy.nwplanes, 1);
        assert!(report.kernel_artifact.is_none());
        assert!(report.artifact.exists());
        assert!(report.artifact.to_string_lossy().contains("sim_8_restored"));
        assert_eq!(
            report.stage_path(),
            vec![
                Stage::Init,
                Stage::Ingesting,
                Stage::Advising,
                Stage::MajorCycleImaging,
                Stage::Finalizing
            ]
        );
        let entered: Vec<Stage> = rx
            .try_iter()
            .filter(|u| !u.is_finished())
            .map(|u| u.stage)
            .collect();
        assert_eq!(entered.last(), Some(&Stage::Done));
    }

    #[test]
    fn kernel_contexts_export_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            context: Context::WProjection,
            mode: Mode::Invert,
            ..config(tmp.path())
        };
        let report = driver(cfg).run().unwrap();
        let cf = report.kernel_artifact.clone().expect("kernel exported");
        assert!(cf.exists());
        assert!(report.stage_path().contains(&Stage::KernelBuild));
        assert!(report.artifact.to_string_lossy().contains("sim_8_dirty"));
    }

    #[test]
    fn uniform_weighting_enters_barrier() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            weighting: Weighting::Uniform,
            ..config(tmp.path())
        };
        let report = driver(cfg).run().unwrap();
        assert!(report.stage_path().contains(&Stage::WeightingBarrier));
    }

    #[test]
    fn configuration_error_precedes_backend_work() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            channels: (5, 1),
            ..config(tmp.path())
        };
        let drv = driver(cfg);
        let err = drv.run().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Init));
        assert!(err.is_configuration());
        assert_eq!(drv.backend().task_stats().submitted, 0);
    }

    #[test]
    fn failing_partition_aborts_without_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            channels: (1020, 1027),
            ..config(tmp.path())
        };
        let err = driver(cfg).run().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Advising));
        assert_eq!(err.partition(), Some(1));
        assert!(matches!(err.root(), PipelineError::TaskExecution { .. }));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
