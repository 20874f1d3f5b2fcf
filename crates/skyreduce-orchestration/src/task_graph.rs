//! Per-partition deferred computations.
//!
//! Partitions are independent until the weighting barrier; nothing here
//! orders one partition's tasks against another's. Within a partition each
//! task declares the handles it reads, so it is scheduled after them.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use skyreduce_core::advisory::Advisory;
use skyreduce_core::collaborators::{Collaborators, ImagingInputs};
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{ConvolutionKernel, Image, ImagingOutcome, PartitionedDataset};
use skyreduce_core::options::{CoalescePolicy, DeconvolutionControls, IngestOptions, KernelParams, Mode};
use skyreduce_core::partition::Partition;
use skyreduce_core::strategy::{ImageGeometry, StrategyConfig};
use skyreduce_exec::{BackendExt, Deferred, Dependency, ExecutionBackend, TaskSpec};

/// Builds deferred tasks on a backend.
#[derive(Clone)]
pub struct TaskGraph {
    backend: Arc<dyn ExecutionBackend>,
    collaborators: Collaborators,
    ingest: IngestOptions,
}

impl TaskGraph {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        collaborators: Collaborators,
        ingest: IngestOptions,
    ) -> Self {
        Self {
            backend,
            collaborators,
            ingest,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Read one partition and convert it, or compress it when the coalescing
    /// thresholds ask for it. Exactly one of the two paths runs.
    pub fn build_ingest(&self, partition: Partition, source: &str) -> Deferred<PartitionedDataset> {
        let reader = Arc::clone(&self.collaborators.reader);
        let converter = Arc::clone(&self.collaborators.converter);
        let coalesce = self.ingest.coalesce;
        let source = source.to_string();
        self.backend.submit(
            TaskSpec::new("ingest").partition(partition.index),
            move || {
                let started = Instant::now();
                let raw = reader.read(&source, &partition)?;
                let dataset = match coalesce {
                    CoalescePolicy::Convert => converter.convert(&raw)?,
                    CoalescePolicy::Compress { time, frequency } => {
                        converter.compress(&raw, time, frequency)?
                    }
                };
                debug!(
                    partition = %partition,
                    before = raw.nvis(),
                    after = dataset.rows.len(),
                    compressed = dataset.compressed,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "read and converted"
                );
                Ok(dataset)
            },
        )
    }

    /// One ingest task per partition, in partition order.
    pub fn build_ingest_all(
        &self,
        partitions: &[Partition],
        source: &str,
    ) -> Vec<Deferred<PartitionedDataset>> {
        partitions
            .iter()
            .map(|p| self.build_ingest(*p, source))
            .collect()
    }

    /// Advisory for one partition's dataset.
    pub fn build_advice(&self, dataset: &Deferred<PartitionedDataset>) -> Deferred<Advisory> {
        let advisor = Arc::clone(&self.collaborators.advisor);
        let IngestOptions {
            guard_band,
            amplitude_loss,
            ..
        } = self.ingest;
        let input = dataset.clone();
        self.backend.submit_after(
            spec_like("advise", dataset),
            &[dataset as &dyn Dependency],
            move || advisor.advise(&*input.get()?, guard_band, amplitude_loss),
        )
    }

    /// Empty model image for one partition. The geometry must already be resolved.
    pub fn build_model(
        &self,
        dataset: &Deferred<PartitionedDataset>,
        geometry: ImageGeometry,
    ) -> Deferred<Image> {
        let builder = Arc::clone(&self.collaborators.models);
        let input = dataset.clone();
        self.backend.submit_after(
            spec_like("model", dataset),
            &[dataset as &dyn Dependency],
            move || builder.build_model(&*input.get()?, &geometry),
        )
    }

    /// Gridding kernel for one model.
    pub fn build_kernel(&self, model: &Deferred<Image>, params: KernelParams) -> Deferred<ConvolutionKernel> {
        let constructor = Arc::clone(&self.collaborators.kernels);
        let input = model.clone();
        self.backend.submit_after(
            spec_like("kernel", model),
            &[model as &dyn Dependency],
            move || constructor.build_kernel(&*input.get()?, &params),
        )
    }

    /// The imaging workflow over every partition.
    pub fn build_imaging(
        &self,
        mode: Mode,
        datasets: &[Deferred<PartitionedDataset>],
        models: &[Deferred<Image>],
        kernels: Option<&[Deferred<ConvolutionKernel>]>,
        strategy: StrategyConfig,
        controls: DeconvolutionControls,
    ) -> Deferred<ImagingOutcome> {
        let mut deps: Vec<&dyn Dependency> = Vec::new();
        deps.extend(datasets.iter().map(|d| d as &dyn Dependency));
        deps.extend(models.iter().map(|m| m as &dyn Dependency));
        if let Some(kernels) = kernels {
            deps.extend(kernels.iter().map(|k| k as &dyn Dependency));
        }

        let imaging = Arc::clone(&self.collaborators.imaging);
        let datasets = datasets.to_vec();
        let models = models.to_vec();
        let kernels = kernels.map(<[_]>::to_vec);
        let label = match mode {
            Mode::Pipeline => "continuum-imaging",
            Mode::Invert => "invert",
        };
        // Invert slices the visibilities into one chunk per w plane.
        let strategy = match mode {
            Mode::Pipeline => strategy,
            Mode::Invert => StrategyConfig {
                vis_slices: strategy.nwplanes,
                ..strategy
            },
        };
        self.backend.submit_after(TaskSpec::new(label), &deps, move || {
            let datasets = collect(&datasets)?;
            let models = collect(&models)?;
            let kernels = kernels.as_deref().map(collect).transpose()?;
            let inputs = ImagingInputs {
                datasets: &datasets,
                models: &models,
                kernels: kernels.as_deref(),
                strategy: &strategy,
            };
            match mode {
                Mode::Pipeline => imaging.run(inputs, &controls),
                Mode::Invert => imaging.invert(inputs),
            }
        })
    }
}

fn spec_like<T>(label: &str, upstream: &Deferred<T>) -> TaskSpec {
    let spec = TaskSpec::new(label);
    match upstream.spec().partition {
        Some(p) => spec.partition(p),
        None => spec,
    }
}

fn collect<T>(handles: &[Deferred<T>]) -> Result<Vec<Arc<T>>, PipelineError> {
    handles.iter().map(Deferred::get).collect()
}
