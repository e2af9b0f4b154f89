//! Postprocessor - forecast tensor to physical, georeferenced grid files
//!
//! Each of the K forecast planes is upsampled (bicubic) to the native grid
//! of the window, denormalized to dBZ and clipped. Values below the
//! physical threshold become missing, not zero. One grid document is written
//! per lead time under `<output>/<base %Y%m%d-%H%M%S>/`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ForecastConfig, RadarConfig};
use crate::grid::{denormalize, Grid2D, GridCodec, GridDocument, GridError, GridGeometry};
use crate::inference::Tensor;
use crate::types::{lead_minutes_for_step, valid_time, ForecastOutput, ForecastSet, Window};

const SOURCE_ATTRIBUTE: &str = "ConvLSTM Model Prediction";

#[derive(Debug, thiserror::Error)]
pub enum PostprocessError {
    #[error("forecast tensor {shape:?} is not (1, K, 1, H, W)")]
    Shape { shape: [usize; 5] },

    #[error("window is empty")]
    EmptyWindow,

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Forecast grids of one cycle, in lead order, with where they were written.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub set: ForecastSet,
    pub grids: Vec<Grid2D>,
    pub geometry: GridGeometry,
}

pub struct Postprocessor {
    codec: Arc<dyn GridCodec>,
    output_root: PathBuf,
    extension: String,
    variable: String,
    radar_name: String,
    institution: String,
    min_dbz: f32,
    max_dbz: f32,
    threshold_dbz: f32,
    forecast: ForecastConfig,
}

impl Postprocessor {
    pub fn new(
        codec: Arc<dyn GridCodec>,
        output_root: &Path,
        extension: &str,
        radar: &RadarConfig,
        forecast: &ForecastConfig,
    ) -> Self {
        Self {
            codec,
            output_root: output_root.to_path_buf(),
            extension: extension.to_string(),
            variable: radar.variable_name.clone(),
            radar_name: radar.radar_name.clone(),
            institution: radar.institution.clone(),
            min_dbz: radar.min_dbz,
            max_dbz: radar.max_dbz,
            threshold_dbz: radar.physical_threshold_dbz,
            forecast: forecast.clone(),
        }
    }

    /// Lead spacing in minutes: the observed cadence of the window's two
    /// most recent frames when it is plausible, else the configured default.
    pub fn lead_spacing_minutes(&self, window: &Window) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let observed = window
            .last_cadence()
            .map(|d| d.num_milliseconds() as f64 / 60_000.0);
        match observed {
            Some(m) if m > 0.0 && m >= self.forecast.min_cadence_minutes && m <= self.forecast.max_cadence_minutes => m,
            Some(m) => {
                debug!(
                    observed_minutes = m,
                    default_minutes = self.forecast.default_interval_minutes,
                    "Cadence out of range, using default lead spacing"
                );
                self.forecast.default_interval_minutes
            }
            None => self.forecast.default_interval_minutes,
        }
    }

    /// Cycle output directory for a window ending at `base`.
    pub fn cycle_dir(&self, base: DateTime<Utc>) -> PathBuf {
        self.output_root.join(base.format("%Y%m%d-%H%M%S").to_string())
    }

    /// Turn `output` into physical grids on `geometry` and write them.
    pub fn build(&self, output: &Tensor, window: &Window, geometry: &GridGeometry) -> Result<Forecast, PostprocessError> {
        let [b, k, c, _, _] = output.shape();
        if b != 1 || c != 1 || k == 0 {
            return Err(PostprocessError::Shape { shape: output.shape() });
        }
        let base = window.last().ok_or(PostprocessError::EmptyWindow)?.timestamp;
        let spacing = self.lead_spacing_minutes(window);
        let cycle_dir = self.cycle_dir(base);
        let (native_h, native_w) = (geometry.height(), geometry.width());

        let mut outputs = Vec::with_capacity(k);
        let mut grids = Vec::with_capacity(k);
        for step in 0..k {
            let grid = self.to_physical(output, step, native_h, native_w)?;
            let lead = lead_minutes_for_step(step, spacing);
            let valid = valid_time(base, lead);
            let path = cycle_dir.join(format!("{}.{}", valid.format("%Y%m%d_%H%M%S"), self.extension));

            let doc = self.document(valid, lead, &grid, geometry);
            self.codec.write(&path, &doc)?;
            debug!(lead_minutes = lead, path = %path.display(), "Forecast grid written");

            outputs.push(ForecastOutput {
                lead_minutes: lead,
                valid_time: valid,
                path,
            });
            grids.push(grid);
        }

        info!(
            grids = outputs.len(),
            spacing_minutes = spacing,
            dir = %cycle_dir.display(),
            "📦 Forecast set written"
        );

        Ok(Forecast {
            set: ForecastSet {
                base_time: base,
                output_dir: cycle_dir,
                outputs,
            },
            grids,
            geometry: geometry.clone(),
        })
    }

    /// Upsample, denormalize, clip and threshold one forecast plane.
    fn to_physical(&self, output: &Tensor, step: usize, height: usize, width: usize) -> Result<Grid2D, GridError> {
        let [_, _, _, h, w] = output.shape();
        let plane = Grid2D::new(h, w, output.frame(0, step, 0).to_vec())?;
        let mut grid = if (h, w) == (height, width) {
            plane
        } else {
            plane.resize_bicubic(height, width)
        };
        let (min, max, threshold) = (self.min_dbz, self.max_dbz, self.threshold_dbz);
        grid.map_in_place(|n| {
            let v = denormalize(n, min, max);
            if v < threshold {
                f32::NAN
            } else {
                v
            }
        });
        Ok(grid)
    }

    fn document(&self, valid: DateTime<Utc>, lead: f64, grid: &Grid2D, geometry: &GridGeometry) -> GridDocument {
        let lead_label = format_lead(lead);
        GridDocument::from_grid(valid, &self.variable, "dBZ", grid, geometry)
            .with_lead(lead)
            .with_attribute("title", format!("{} - Forecast t+{lead_label}min", self.radar_name))
            .with_attribute("institution", self.institution.clone())
            .with_attribute("source", SOURCE_ATTRIBUTE)
            .with_attribute("history", format!("Created {}", Utc::now().to_rfc3339()))
            .with_attribute("comment", format!("Forecast data from model. Lead time: {lead_label} min."))
    }
}

/// `3` for whole minutes, `3.5` otherwise.
fn format_lead(lead: f64) -> String {
    if lead.fract().abs() < 1e-9 {
        format!("{lead:.0}")
    } else {
        format!("{lead}")
    }
}
