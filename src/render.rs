//! Renderer sidecars
//!
//! Raster rendering lives outside this crate. For each grid we hand it a
//! `<stem>.meta.json` next to the grid file with the geographic bounds, the
//! valid time, the lead time for forecasts, and the cells detected on that
//! grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::grid::GridGeometry;
use crate::storage::StoreError;
use crate::types::StormCell;

pub const SIDECAR_SUFFIX: &str = "meta.json";

/// Contents of one sidecar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    /// `[[lat_min, lon_min], [lat_max, lon_max]]`
    pub bounds: [[f64; 2]; 2],
    pub target_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_minutes: Option<f64>,
    pub cells: Vec<StormCell>,
}

/// Writes sidecars. Disabled renderers accept calls and write nothing.
#[derive(Debug, Clone, Copy)]
pub struct SidecarRenderer {
    enabled: bool,
}

impl SidecarRenderer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `dir/20260125_121030.json` -> `dir/20260125_121030.meta.json`
    pub fn sidecar_path(grid_path: &Path) -> PathBuf {
        let stem = grid_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        grid_path.with_file_name(format!("{stem}.{SIDECAR_SUFFIX}"))
    }

    /// Write the sidecar for `grid_path`. Returns the path written, if any.
    pub fn write(
        &self,
        grid_path: &Path,
        geometry: &GridGeometry,
        target_time: DateTime<Utc>,
        lead_minutes: Option<f64>,
        cells: &[StormCell],
    ) -> Result<Option<PathBuf>, StoreError> {
        if !self.enabled {
            return Ok(None);
        }
        let meta = SidecarMetadata {
            bounds: geometry.bounds(),
            target_time,
            lead_minutes,
            cells: cells.to_vec(),
        };
        let path = Self::sidecar_path(grid_path);
        let io = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(&path, json).map_err(io)?;
        debug!(path = %path.display(), cells = cells.len(), "Sidecar written");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ProjectionInfo;
    use crate::types::SeverityTier;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            SidecarRenderer::sidecar_path(Path::new("/out/c/20260125_121030.json")),
            PathBuf::from("/out/c/20260125_121030.meta.json")
        );
    }

    #[test]
    fn test_write_contents() {
        let dir = tempdir().unwrap();
        let grid_path = dir.path().join("20260125_121030.json");
        let geometry = GridGeometry::native(10, 10, ProjectionInfo::new(-34.6, -68.0, 6_378_137.0));
        let cell = StormCell {
            lat: -34.6,
            lon: -68.0,
            max_dbz: 59.0,
            severity: SeverityTier::ProbableHail,
            area_px: 3,
        };
        let at = Utc.with_ymd_and_hms(2026, 1, 25, 12, 10, 30).unwrap();

        let written = SidecarRenderer::new(true)
            .write(&grid_path, &geometry, at, Some(3.5), &[cell])
            .unwrap()
            .unwrap();
        let meta: SidecarMetadata = serde_json::from_slice(&std::fs::read(written).unwrap()).unwrap();
        assert_eq!(meta.cells.len(), 1);
        assert_eq!(meta.lead_minutes, Some(3.5));
        let [[lat_min, lon_min], [lat_max, lon_max]] = meta.bounds;
        assert!(lat_min < -34.6 && lat_max > -34.6);
        assert!(lon_min < -68.0 && lon_max > -68.0);
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempdir().unwrap();
        let grid_path = dir.path().join("a.json");
        let geometry = GridGeometry::native(2, 2, ProjectionInfo::new(0.0, 0.0, 6_378_137.0));
        let out = SidecarRenderer::new(false)
            .write(&grid_path, &geometry, Utc::now(), None, &[])
            .unwrap();
        assert!(out.is_none());
        assert!(!SidecarRenderer::sidecar_path(&grid_path).exists());
    }
}
