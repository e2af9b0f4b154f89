//! Preprocessor - window of grid files to a normalized model tensor
//!
//! Per frame: decode, fill missing with the domain minimum, composite over
//! levels, clip, rescale to [0, 1], and resample to the model resolution.
//! Frames are stacked oldest first into `(1, N, 1, H, W)`.
//!
//! A frame that cannot be decoded, or whose native shape disagrees with the
//! most recent readable frame, becomes a slot of zeros.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ModelConfig, RadarConfig};
use crate::grid::{normalize, Grid2D, GridCodec, GridGeometry, ProjectionInfo};
use crate::inference::Tensor;
use crate::types::{Frame, Window};

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("none of the {window} frames in the window could be read")]
    NoReadableFrames { window: usize },
}

/// Model input plus what the postprocessor and detector need from the window.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub tensor: Tensor,
    /// Native `(height, width)` of the most recent readable frame
    pub native_shape: (usize, usize),
    pub geometry: GridGeometry,
    /// Physical composite of the most recent readable frame
    pub latest_composite: Grid2D,
    /// The frame `latest_composite` came from
    pub latest_frame: Frame,
    /// Frames replaced by zeros
    pub malformed: usize,
}

pub struct Preprocessor {
    codec: Arc<dyn GridCodec>,
    variable: String,
    min_dbz: f32,
    max_dbz: f32,
    height: usize,
    width: usize,
    fallback_projection: ProjectionInfo,
}

impl Preprocessor {
    pub fn new(codec: Arc<dyn GridCodec>, radar: &RadarConfig, model: &ModelConfig) -> Self {
        Self {
            codec,
            variable: radar.variable_name.clone(),
            min_dbz: radar.min_dbz,
            max_dbz: radar.max_dbz,
            height: model.input_height,
            width: model.input_width,
            fallback_projection: ProjectionInfo::new(
                radar.sensor_latitude,
                radar.sensor_longitude,
                radar.earth_radius_m,
            ),
        }
    }

    pub fn build(&self, window: &Window) -> Result<Preprocessed, PreprocessError> {
        let n = window.len();
        let mut tensor = Tensor::zeros([1, n, 1, self.height, self.width]);
        let mut reference: Option<(Grid2D, GridGeometry, Frame)> = None;
        let mut malformed = 0;

        // Newest first so the reference shape comes from the latest frame.
        for (slot, frame) in window.frames().iter().enumerate().rev() {
            let (composite, geometry) = match self.load_composite(frame) {
                Ok(loaded) => loaded,
                Err(reason) => {
                    warn!(frame = %frame.path.display(), reason = %reason, "Malformed frame, zero-filled");
                    malformed += 1;
                    continue;
                }
            };

            if let Some((reference_grid, _, _)) = &reference {
                if reference_grid.shape() != composite.shape() {
                    warn!(
                        frame = %frame.path.display(),
                        shape = ?composite.shape(),
                        expected = ?reference_grid.shape(),
                        "Frame shape differs from window, zero-filled"
                    );
                    malformed += 1;
                    continue;
                }
            }

            let normalized = self.normalize_and_resample(&composite);
            tensor.frame_mut(0, slot, 0).copy_from_slice(normalized.data());

            if reference.is_none() {
                reference = Some((composite, geometry, frame.clone()));
            }
        }

        let (latest_composite, geometry, latest_frame) =
            reference.ok_or(PreprocessError::NoReadableFrames { window: n })?;

        debug!(
            frames = n,
            malformed,
            native = ?latest_composite.shape(),
            model = ?(self.height, self.width),
            "Window preprocessed"
        );

        Ok(Preprocessed {
            tensor,
            native_shape: latest_composite.shape(),
            geometry,
            latest_composite,
            latest_frame,
            malformed,
        })
    }

    /// Decode one frame into a clipped physical composite and its geometry.
    fn load_composite(&self, frame: &Frame) -> Result<(Grid2D, GridGeometry), String> {
        let loaded = self.codec.read(&frame.path, &self.variable).map_err(|e| e.to_string())?;
        let (h, w) = (loaded.volume.height(), loaded.volume.width());
        if h == 0 || w == 0 {
            return Err(format!("empty grid {h}x{w}"));
        }
        let geometry = loaded.geometry(&self.fallback_projection);
        let mut volume = loaded.volume;
        volume.fill_missing(self.min_dbz);
        let mut composite = volume.composite_max();
        let (min, max) = (self.min_dbz, self.max_dbz);
        composite.map_in_place(|v| v.clamp(min, max));
        Ok((composite, geometry))
    }

    fn normalize_and_resample(&self, composite: &Grid2D) -> Grid2D {
        let mut normalized = composite.clone();
        let (min, max) = (self.min_dbz, self.max_dbz);
        normalized.map_in_place(|v| normalize(v, min, max));
        if normalized.shape() == (self.height, self.width) {
            normalized
        } else {
            normalized.resize_bilinear(self.height, self.width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridDocument, JsonGridCodec};
    use crate::types::FrameFormat;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use tempfile::tempdir;

    fn preprocessor(h: usize, w: usize) -> Preprocessor {
        let model = ModelConfig {
            input_height: h,
            input_width: w,
            forecast_steps: 2,
        };
        Preprocessor::new(Arc::new(JsonGridCodec::default()), &RadarConfig::default(), &model)
    }

    fn write_frame(dir: &Path, minute: u32, grid: &Grid2D) -> Frame {
        let at = Utc.with_ymd_and_hms(2026, 1, 25, 12, minute, 0).unwrap();
        let geometry = GridGeometry::native(grid.height(), grid.width(), ProjectionInfo::new(-34.6, -68.0, 6_378_137.0));
        let doc = GridDocument::from_grid(at, "DBZ", "dBZ", grid, &geometry);
        let path = dir.join(format!("2026012512{minute:02}00.json"));
        JsonGridCodec::default().write(&path, &doc).unwrap();
        Frame::new(path, at, FrameFormat::Converted)
    }

    #[test]
    fn test_tensor_values_normalized_oldest_first() {
        let dir = tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), 0, &Grid2D::filled(4, 4, -29.0)),
            write_frame(dir.path(), 3, &Grid2D::filled(4, 4, 65.0)),
        ];
        let out = preprocessor(4, 4).build(&Window::new(frames)).unwrap();
        assert_eq!(out.tensor.shape(), [1, 2, 1, 4, 4]);
        assert!(out.tensor.frame(0, 0, 0).iter().all(|v| v.abs() < 1e-6));
        assert!(out.tensor.frame(0, 1, 0).iter().all(|v| (v - 1.0).abs() < 1e-6));
        assert_eq!(out.native_shape, (4, 4));
        assert_eq!(out.malformed, 0);
    }

    #[test]
    fn test_missing_values_become_minimum() {
        let dir = tempdir().unwrap();
        let mut grid = Grid2D::filled(2, 2, 40.0);
        grid.set(0, 0, f32::NAN);
        let frames = vec![write_frame(dir.path(), 0, &grid)];
        let out = preprocessor(2, 2).build(&Window::new(frames)).unwrap();
        assert!(out.tensor.frame(0, 0, 0)[0].abs() < 1e-6);
        assert!((out.latest_composite.get(0, 0) - -29.0).abs() < 1e-6);
    }

    #[test]
    fn test_resampled_to_model_resolution() {
        let dir = tempdir().unwrap();
        let frames = vec![write_frame(dir.path(), 0, &Grid2D::filled(8, 8, 18.0))];
        let out = preprocessor(4, 4).build(&Window::new(frames)).unwrap();
        assert_eq!(out.tensor.shape(), [1, 1, 1, 4, 4]);
        assert_eq!(out.native_shape, (8, 8));
        let expected = normalize(18.0, -29.0, 65.0);
        assert!(out.tensor.data().iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_unreadable_frame_zero_filled() {
        let dir = tempdir().unwrap();
        let good = write_frame(dir.path(), 3, &Grid2D::filled(2, 2, 65.0));
        let bad_path = dir.path().join("20260125120000.json");
        std::fs::write(&bad_path, b"not json").unwrap();
        let bad = Frame::new(bad_path, Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap(), FrameFormat::Converted);

        let out = preprocessor(2, 2).build(&Window::new(vec![bad, good])).unwrap();
        assert_eq!(out.malformed, 1);
        assert!(out.tensor.frame(0, 0, 0).iter().all(|v| *v == 0.0));
        assert!(out.tensor.frame(0, 1, 0).iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_shape_mismatch_zero_filled() {
        let dir = tempdir().unwrap();
        let frames = vec![
            write_frame(dir.path(), 0, &Grid2D::filled(3, 3, 65.0)),
            write_frame(dir.path(), 3, &Grid2D::filled(2, 2, 65.0)),
        ];
        let out = preprocessor(2, 2).build(&Window::new(frames)).unwrap();
        assert_eq!(out.malformed, 1);
        assert_eq!(out.native_shape, (2, 2));
    }

    #[test]
    fn test_all_frames_unreadable_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("20260125120000.json");
        std::fs::write(&path, b"{").unwrap();
        let frame = Frame::new(path, Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap(), FrameFormat::Converted);
        let err = preprocessor(2, 2).build(&Window::new(vec![frame])).unwrap_err();
        assert!(matches!(err, PreprocessError::NoReadableFrames { window: 1 }));
    }

    #[test]
    fn test_composite_over_levels() {
        let dir = tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap();
        let geometry = GridGeometry::native(1, 2, ProjectionInfo::new(-34.6, -68.0, 6_378_137.0));
        let mut doc = GridDocument::from_grid(at, "DBZ", "dBZ", &Grid2D::filled(1, 2, 0.0), &geometry);
        let field = doc.fields.get_mut("DBZ").unwrap();
        field.shape = vec![2, 1, 2];
        field.data = vec![10.0, 50.0, 30.0, -999.0];
        let path = dir.path().join("20260125120000.json");
        JsonGridCodec::default().write(&path, &doc).unwrap();

        let frame = Frame::new(path, at, FrameFormat::Converted);
        let out = preprocessor(1, 2).build(&Window::new(vec![frame])).unwrap();
        assert_eq!(out.latest_composite.data(), &[30.0, 50.0]);
    }
}
