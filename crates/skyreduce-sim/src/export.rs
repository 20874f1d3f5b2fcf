//! JSON image export and image statistics.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use skyreduce_core::collaborators::Exporter;
use skyreduce_core::error::PipelineError;
use skyreduce_core::model::{Image, QualityReport};

/// Writes images as `<path>.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn export(&self, image: &Image, path: &Path) -> Result<PathBuf, PipelineError> {
        let mut name = OsString::from(path.as_os_str());
        name.push(".json");
        let target = PathBuf::from(name);
        let fail = |message: String| PipelineError::Export {
            path: target.display().to_string(),
            message,
        };

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let file = File::create(&target).map_err(|e| fail(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, image).map_err(|e| fail(e.to_string()))?;
        writer.flush().map_err(|e| fail(e.to_string()))?;
        debug!(path = %target.display(), npixel = image.npixel, "exported image");
        Ok(target)
    }

    fn summarize(&self, image: &Image) -> QualityReport {
        let shape = (image.npixel, image.npixel);
        if image.data.is_empty() {
            return QualityReport {
                shape,
                max: 0.0,
                min: 0.0,
                maxabs: 0.0,
                rms: 0.0,
                sum: 0.0,
                medianabs: 0.0,
            };
        }
        let data = &image.data;
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let sum: f64 = data.iter().sum();
        let rms = (data.iter().map(|v| v * v).sum::<f64>() / data.len() as f64).sqrt();

        let mut abs: Vec<f64> = data.iter().map(|v| v.abs()).collect();
        abs.sort_by(f64::total_cmp);
        let mid = abs.len() / 2;
        let medianabs = if abs.len() % 2 == 0 {
            (abs[mid - 1] + abs[mid]) / 2.0
        } else {
            abs[mid]
        };

        QualityReport {
            shape,
            max,
            min,
            maxabs: abs[abs.len() - 1],
            rms,
            sum,
            medianabs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(data: Vec<f64>) -> Image {
        Image {
            npixel: 2,
            cellsize: 1e-3,
            frequency: 1e8,
            data,
        }
    }

    #[test]
    fn summary_statistics() {
        let q = JsonExporter.summarize(&image(vec![1.0, -4.0, 2.0, 3.0]));
        assert_eq!(q.shape, (2, 2));
        assert!((q.max - 3.0).abs() < 1e-12);
        assert!((q.min + 4.0).abs() < 1e-12);
        assert!((q.maxabs - 4.0).abs() < 1e-12);
        assert!((q.sum - 2.0).abs() < 1e-12);
        assert!((q.medianabs - 2.5).abs() < 1e-12);
        assert!((q.rms - 7.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn export_appends_extension_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(vec![0.5; 4]);
        let written = JsonExporter
            .export(&img, &dir.path().join("nested/EoR0.v2_restored"))
            .unwrap();
        assert!(written.ends_with("nested/EoR0.v2_restored.json"));
        let back: Image = serde_json::from_slice(&fs::read(&written).unwrap()).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn unwritable_target_is_an_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = JsonExporter
            .export(&image(vec![0.0; 4]), &blocker.join("out"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Export { .. }));
    }
}
