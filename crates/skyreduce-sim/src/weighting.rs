//! Uniform weighting by gridded sample density.

use std::collections::HashMap;
use std::sync::Arc;

use skyreduce_core::collaborators::Weighter;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{Image, PartitionedDataset};

use crate::grid::UvGrid;

/// Divides every weight by the total weight that fell in its uv cell,
/// counted over all partitions together.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimWeighter;

impl Weighter for SimWeighter {
    fn weight(
        &self,
        datasets: &[Arc<PartitionedDataset>],
        models: &[Arc<Image>],
    ) -> Result<Vec<PartitionedDataset>, PipelineError> {
        let Some(first) = models.first() else {
            return Err(PipelineError::Collaborator("weighting needs a model grid".into()));
        };
        if let Some(odd) = models.iter().find(|m| !m.same_grid(first)) {
            return Err(PipelineError::Collaborator(format!(
                "model grids differ: {} and {} pixels",
                first.npixel, odd.npixel
            )));
        }
        let grid = UvGrid::for_image(first);

        let mut density: HashMap<usize, f64> = HashMap::new();
        for row in datasets.iter().flat_map(|d| &d.rows) {
            if let Some(cell) = grid.cell(row.uvw) {
                *density.entry(cell).or_default() += row.weight;
            }
        }

        Ok(datasets
            .iter()
            .map(|d| {
                let mut out = PartitionedDataset::clone(d);
                for row in &mut out.rows {
                    if let Some(total) = grid.cell(row.uvw).and_then(|c| density.get(&c)) {
                        if *total > 0.0 {
                            row.imaging_weight = row.weight / total;
                        }
                    }
                }
                out
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyreduce_core::model::Visibility;
    use skyreduce_core::partition::Partition;

    fn dataset(index: usize, uvw: &[[f64; 3]]) -> Arc<PartitionedDataset> {
        Arc::new(PartitionedDataset {
            partition: Partition {
                index,
                start: index as u64,
                end: index as u64,
            },
            frequencies: vec![1e8],
            rows: uvw
                .iter()
                .map(|uvw| Visibility {
                    time: 0.0,
                    frequency: 1e8,
                    uvw: *uvw,
                    vis: 1.0,
                    weight: 1.0,
                    imaging_weight: 1.0,
                })
                .collect(),
            compressed: false,
        })
    }

    #[test]
    fn density_spans_partitions() {
        let model = Arc::new(Image::zeros(16, 1e-2, 1e8));
        let a = dataset(0, &[[10.0, 0.0, 0.0], [-30.0, 20.0, 0.0]]);
        let b = dataset(1, &[[10.5, 0.2, 0.0]]);
        let out = SimWeighter
            .weight(&[a, b], &[Arc::clone(&model), model])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[0].rows[0].imaging_weight - 0.5).abs() < 1e-12);
        assert!((out[0].rows[1].imaging_weight - 1.0).abs() < 1e-12);
        assert!((out[1].rows[0].imaging_weight - 0.5).abs() < 1e-12);
        assert!((out[1].rows[0].weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn samples_off_the_grid_keep_their_weight() {
        let model = Arc::new(Image::zeros(8, 1e-2, 1e8));
        let ds = dataset(0, &[[1.0e4, 0.0, 0.0]]);
        let out = SimWeighter.weight(&[ds], &[model]).unwrap();
        assert!((out[0].rows[0].imaging_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_models_fail() {
        let ds = dataset(0, &[[1.0, 0.0, 0.0]]);
        let models = [
            Arc::new(Image::zeros(8, 1e-2, 1e8)),
            Arc::new(Image::zeros(16, 1e-2, 1e8)),
        ];
        assert!(SimWeighter.weight(&[ds], &models).is_err());
        assert!(SimWeighter.weight(&[], &[]).is_err());
    }
}
