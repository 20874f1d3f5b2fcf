//! The weighting barrier.
//!
//! Uniform weighting normalizes by a density computed over every partition,
//! so it runs as one collective task that depends on all dataset and model
//! handles. Per-partition handles are then projected back out of its result.

use std::sync::Arc;

use tracing::info;

use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{Image, PartitionedDataset};
use skyreduce_core::options::Weighting;
use skyreduce_exec::{BackendExt, Deferred, Dependency, TaskSpec};

use crate::task_graph::TaskGraph;

/// Apply `weighting` to the dataset handles.
///
/// Schemes without global normalization return `datasets` unchanged.
pub fn apply_weighting(
    graph: &TaskGraph,
    weighting: Weighting,
    datasets: Vec<Deferred<PartitionedDataset>>,
    models: &[Deferred<Image>],
) -> Vec<Deferred<PartitionedDataset>> {
    if !weighting.requires_global_normalization() {
        return datasets;
    }
    info!(
        weighting = %weighting,
        partitions = datasets.len(),
        "applying collective weighting"
    );

    let backend = graph.backend();
    let weighter = Arc::clone(&graph.collaborators().weighter);
    let deps: Vec<&dyn Dependency> = datasets
        .iter()
        .map(|d| d as &dyn Dependency)
        .chain(models.iter().map(|m| m as &dyn Dependency))
        .collect();
    let inputs = datasets.clone();
    let model_inputs = models.to_vec();
    let expected = datasets.len();

    let weighted: Deferred<Vec<Arc<PartitionedDataset>>> = backend.submit_after(
        TaskSpec::new("weighting").collective(),
        &deps,
        move || {
            let datasets = inputs
                .iter()
                .map(Deferred::get)
                .collect::<Result<Vec<_>, _>>()?;
            let models = model_inputs
                .iter()
                .map(Deferred::get)
                .collect::<Result<Vec<_>, _>>()?;
            let out = weighter.weight(&datasets, &models)?;
            if out.len() != expected {
                return Err(PipelineError::CollectiveBarrier(format!(
                    "weighting returned {} datasets for {expected} partitions",
                    out.len()
                )));
            }
            Ok(out.into_iter().map(Arc::new).collect())
        },
    );

    datasets
        .iter()
        .enumerate()
        .map(|(slot, original)| {
            let all = weighted.clone();
            let mut spec = TaskSpec::new("weighted");
            if let Some(p) = original.spec().partition {
                spec = spec.partition(p);
            }
            backend.submit_shared(spec, &[&weighted as &dyn Dependency], move || {
                all.get()?.get(slot).map(Arc::clone).ok_or_else(|| {
                    PipelineError::CollectiveBarrier(format!("no weighted dataset for slot {slot}"))
                })
            })
        })
        .collect()
}
