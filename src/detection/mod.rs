//! Storm Cell Detector
//!
//! Labels 8-connected regions of a composite reflectivity field above the
//! cell threshold and classifies each one by its peak value. The detector is
//! stateless: cells are recomputed from scratch on every call.

use tracing::debug;

use crate::config::CellConfig;
use crate::grid::{Grid2D, GridError, GridGeometry};
use crate::types::{SeverityTier, StormCell};

#[derive(Debug, Clone)]
pub struct CellDetector {
    threshold_dbz: f32,
    severe_dbz: f32,
    hail_dbz: f32,
}

impl CellDetector {
    pub fn new(config: &CellConfig) -> Self {
        Self {
            threshold_dbz: config.threshold_dbz,
            severe_dbz: config.severe_dbz,
            hail_dbz: config.hail_dbz,
        }
    }

    /// Detect cells in `composite`, georeferenced through `geometry`.
    ///
    /// Missing samples (NaN) never belong to a cell. Cells are returned
    /// strongest first.
    pub fn detect(&self, composite: &Grid2D, geometry: &GridGeometry) -> Result<Vec<StormCell>, GridError> {
        let (h, w) = composite.shape();
        if geometry.height() != h || geometry.width() != w {
            return Err(GridError::Shape {
                expected: h * w,
                actual: geometry.height() * geometry.width(),
            });
        }

        // NaN > threshold is false.
        let mask: Vec<bool> = composite.data().iter().map(|v| *v > self.threshold_dbz).collect();
        if !mask.iter().any(|m| *m) {
            return Ok(Vec::new());
        }

        let mut cells: Vec<StormCell> = label_components(&mask, h, w)
            .into_iter()
            .map(|component| self.describe(&component, composite, geometry))
            .collect();
        cells.sort_by(|a, b| b.max_dbz.total_cmp(&a.max_dbz));

        debug!(cells = cells.len(), "Storm cells detected");
        Ok(cells)
    }

    fn describe(&self, component: &[(usize, usize)], composite: &Grid2D, geometry: &GridGeometry) -> StormCell {
        let (h, w) = composite.shape();
        let peak = component
            .iter()
            .map(|&(r, c)| composite.get(r, c))
            .fold(f32::NEG_INFINITY, f32::max);

        #[allow(clippy::cast_precision_loss)]
        let n = component.len() as f64;
        let mean_row = component.iter().map(|&(r, _)| r as f64).sum::<f64>() / n;
        let mean_col = component.iter().map(|&(_, c)| c as f64).sum::<f64>() / n;
        let row = round_clamped(mean_row, h);
        let col = round_clamped(mean_col, w);
        let centre = geometry.pixel_to_geo(row, col);

        StormCell {
            lat: centre.lat,
            lon: centre.lon,
            max_dbz: peak,
            severity: SeverityTier::from_peak(peak, self.severe_dbz, self.hail_dbz),
            area_px: component.len(),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_clamped(index: f64, len: usize) -> usize {
    (index.round().max(0.0) as usize).min(len.saturating_sub(1))
}

/// 8-connected components of `mask`, as lists of `(row, col)`.
///
/// Components are discovered in row-major scan order.
fn label_components(mask: &[bool], height: usize, width: usize) -> Vec<Vec<(usize, usize)>> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        let mut component = Vec::new();
        let mut stack = vec![(start / width, start % width)];

        while let Some((row, col)) = stack.pop() {
            component.push((row, col));
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    let (Some(nr), Some(nc)) = (row.checked_add_signed(dr), col.checked_add_signed(dc)) else {
                        continue;
                    };
                    if nr >= height || nc >= width {
                        continue;
                    }
                    let idx = nr * width + nc;
                    if mask[idx] && !visited[idx] {
                        visited[idx] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
        components.push(component);
    }

    components
}
