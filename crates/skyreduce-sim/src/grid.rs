//! Nearest-cell uv grid shared by weighting and imaging.

use std::f64::consts::PI;

use skyreduce_core::model::Image;

/// uv cell layout matching an image: `npixel` cells of `1 / (npixel * cellsize)`
/// wavelengths, with zero spacing at the centre cell.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UvGrid {
    npixel: usize,
    du: f64,
}

impl UvGrid {
    pub(crate) fn for_image(image: &Image) -> Self {
        Self {
            npixel: image.npixel,
            du: 1.0 / (image.npixel as f64 * image.cellsize),
        }
    }

    pub(crate) fn npixel(&self) -> usize {
        self.npixel
    }

    /// (row, col) of the cell nearest to `uvw`, if it lies on the grid.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn position(&self, uvw: [f64; 3]) -> Option<(usize, usize)> {
        let half = (self.npixel / 2) as i64;
        let col = (uvw[0] / self.du).round() as i64 + half;
        let row = (uvw[1] / self.du).round() as i64 + half;
        let n = i64::try_from(self.npixel).ok()?;
        if (0..n).contains(&col) && (0..n).contains(&row) {
            Some((usize::try_from(row).ok()?, usize::try_from(col).ok()?))
        } else {
            None
        }
    }

    /// Flat index of the cell nearest to `uvw`.
    pub(crate) fn cell(&self, uvw: [f64; 3]) -> Option<usize> {
        self.position(uvw).map(|(row, col)| row * self.npixel + col)
    }

    /// Real part of the Fourier transform of `cells` onto an image, with
    /// the phase centre at pixel (npixel/2, npixel/2).
    ///
    /// The transform is separable, so it costs `O(npixel^3)`.
    pub(crate) fn transform(&self, cells: &[f64]) -> Vec<f64> {
        let n = self.npixel;
        let half = (n / 2) as f64;
        let mut cos = vec![0.0; n * n];
        let mut sin = vec![0.0; n * n];
        for k in 0..n {
            for x in 0..n {
                let phase = 2.0 * PI * (k as f64 - half) * (x as f64 - half) / n as f64;
                let (s, c) = phase.sin_cos();
                cos[k * n + x] = c;
                sin[k * n + x] = s;
            }
        }

        // Along u for every v row first.
        let mut re = vec![0.0; n * n];
        let mut im = vec![0.0; n * n];
        for v in 0..n {
            let row = &cells[v * n..(v + 1) * n];
            for x in 0..n {
                let (mut a, mut b) = (0.0, 0.0);
                for (u, value) in row.iter().enumerate() {
                    if *value != 0.0 {
                        a += value * cos[u * n + x];
                        b += value * sin[u * n + x];
                    }
                }
                re[v * n + x] = a;
                im[v * n + x] = b;
            }
        }

        let mut out = vec![0.0; n * n];
        for y in 0..n {
            for x in 0..n {
                out[y * n + x] = (0..n)
                    .map(|v| re[v * n + x] * cos[v * n + y] - im[v * n + x] * sin[v * n + y])
                    .sum();
            }
        }
        out
    }
}
