//! Grid documents on disk
//!
//! A grid document is a self-describing JSON record: one or more named
//! fields with their shape, coordinate axes in kilometres, the projection
//! block, a fill value and free-form attributes. Documents may be
//! zstd-compressed; readers detect this from the magic number, so the file
//! extension does not need to change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::projection::{GridGeometry, ProjectionInfo};
use super::{Grid2D, GridError, Volume};
use crate::config::defaults::FILL_VALUE;

/// zstd frame magic number.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// zstd level used for written documents.
const ZSTD_LEVEL: i32 = 3;

// ============================================================================
// Document Model
// ============================================================================

/// One named data variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridField {
    #[serde(default)]
    pub units: String,
    /// `[ny, nx]`, `[nz, ny, nx]` or `[1, nz, ny, nx]`
    pub shape: Vec<usize>,
    /// Row-major samples; missing samples hold the document fill value
    pub data: Vec<f32>,
}

/// Serialized form of a converted frame or forecast grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDocument {
    pub time_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_minutes: Option<f64>,
    pub fields: BTreeMap<String, GridField>,
    #[serde(default)]
    pub x_km: Vec<f32>,
    #[serde(default)]
    pub y_km: Vec<f32>,
    #[serde(default)]
    pub z_km: Vec<f32>,
    #[serde(default)]
    pub projection: Option<ProjectionInfo>,
    #[serde(default = "default_fill_value")]
    pub fill_value: f32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_fill_value() -> f32 {
    FILL_VALUE
}

impl GridDocument {
    /// Single-level document for a 2-D field. `NaN` is written as the fill value.
    pub fn from_grid(
        time_utc: DateTime<Utc>,
        variable: &str,
        units: &str,
        grid: &Grid2D,
        geometry: &GridGeometry,
    ) -> Self {
        let data = grid
            .data()
            .iter()
            .map(|v| if v.is_finite() { *v } else { FILL_VALUE })
            .collect();
        let mut fields = BTreeMap::new();
        fields.insert(
            variable.to_string(),
            GridField {
                units: units.to_string(),
                shape: vec![1, grid.height(), grid.width()],
                data,
            },
        );
        Self {
            time_utc,
            lead_minutes: None,
            fields,
            x_km: geometry.x_km.clone(),
            y_km: geometry.y_km.clone(),
            z_km: geometry.z_km.first().map_or_else(|| vec![0.0], |z| vec![*z]),
            projection: Some(geometry.projection.clone()),
            fill_value: FILL_VALUE,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_lead(mut self, lead_minutes: f64) -> Self {
        self.lead_minutes = Some(lead_minutes);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Variable Lookup Strategies
// ============================================================================

/// Which lookup strategy found the reflectivity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableMatch {
    Configured(String),
    Uppercase,
    Lowercase,
    FirstField(String),
}

impl VariableMatch {
    pub fn name(&self) -> &str {
        match self {
            VariableMatch::Configured(n) | VariableMatch::FirstField(n) => n,
            VariableMatch::Uppercase => "DBZ",
            VariableMatch::Lowercase => "dbz",
        }
    }
}

/// Try the configured name, then `DBZ`, then `dbz`, then the first field.
fn resolve_variable(doc: &GridDocument, preferred: &str) -> Option<VariableMatch> {
    if doc.fields.contains_key(preferred) {
        return Some(VariableMatch::Configured(preferred.to_string()));
    }
    if doc.fields.contains_key("DBZ") {
        return Some(VariableMatch::Uppercase);
    }
    if doc.fields.contains_key("dbz") {
        return Some(VariableMatch::Lowercase);
    }
    doc.fields
        .keys()
        .next()
        .map(|k| VariableMatch::FirstField(k.clone()))
}

// ============================================================================
// Loaded Grid
// ============================================================================

/// A decoded reflectivity volume with its axes.
#[derive(Debug, Clone)]
pub struct LoadedGrid {
    pub time_utc: DateTime<Utc>,
    pub lead_minutes: Option<f64>,
    pub variable: VariableMatch,
    pub volume: Volume,
    pub x_km: Vec<f32>,
    pub y_km: Vec<f32>,
    pub z_km: Vec<f32>,
    pub projection: Option<ProjectionInfo>,
}

impl LoadedGrid {
    /// Geometry of this grid, using `fallback` when the document carried no
    /// projection and native 1 km axes when it carried no coordinates.
    pub fn geometry(&self, fallback: &ProjectionInfo) -> GridGeometry {
        let projection = self.projection.clone().unwrap_or_else(|| fallback.clone());
        let mut geometry = GridGeometry::native(self.volume.height(), self.volume.width(), projection);
        if self.x_km.len() == self.volume.width() {
            geometry.x_km.clone_from(&self.x_km);
        }
        if self.y_km.len() == self.volume.height() {
            geometry.y_km.clone_from(&self.y_km);
        }
        if !self.z_km.is_empty() {
            geometry.z_km.clone_from(&self.z_km);
        }
        geometry
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Reads and writes grid files.
pub trait GridCodec: Send + Sync {
    /// Decode the reflectivity field of `path`.
    fn read(&self, path: &Path, variable: &str) -> Result<LoadedGrid, GridError>;

    /// Encode `doc` to `path`.
    fn write(&self, path: &Path, doc: &GridDocument) -> Result<(), GridError>;
}

/// JSON grid documents, optionally zstd-compressed on write.
#[derive(Debug, Clone, Default)]
pub struct JsonGridCodec {
    compress: bool,
}

impl JsonGridCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    /// Parse a whole document (all fields).
    pub fn read_document(&self, path: &Path) -> Result<GridDocument, GridError> {
        let raw = fs::read(path).map_err(|source| GridError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = if raw.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(raw.as_slice()).map_err(|e| decode_err(path, &e))?
        } else {
            raw
        };
        serde_json::from_slice(&bytes).map_err(|e| decode_err(path, &e))
    }
}

fn decode_err(path: &Path, e: &dyn std::fmt::Display) -> GridError {
    GridError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Normalise a field shape to `(levels, ny, nx)`.
fn volume_dims(shape: &[usize]) -> Result<(usize, usize, usize), GridError> {
    match *shape {
        [ny, nx] => Ok((1, ny, nx)),
        [nz, ny, nx] => Ok((nz, ny, nx)),
        [1, nz, ny, nx] => Ok((nz, ny, nx)),
        _ => Err(GridError::Rank {
            rank: shape.len(),
            shape: shape.to_vec(),
        }),
    }
}

impl GridCodec for JsonGridCodec {
    fn read(&self, path: &Path, variable: &str) -> Result<LoadedGrid, GridError> {
        let doc = self.read_document(path)?;
        let matched = resolve_variable(&doc, variable).ok_or_else(|| GridError::MissingVariable {
            path: path.to_path_buf(),
            tried: format!("{variable}, DBZ, dbz, <first field>"),
        })?;
        if !matches!(matched, VariableMatch::Configured(_)) {
            debug!(path = %path.display(), variable = matched.name(), "Using fallback reflectivity variable");
        }

        let fill = doc.fill_value;
        let mut fields = doc.fields;
        let field = fields
            .remove(matched.name())
            .ok_or_else(|| GridError::MissingVariable {
                path: path.to_path_buf(),
                tried: matched.name().to_string(),
            })?;
        let (nz, ny, nx) = volume_dims(&field.shape)?;
        let data = field
            .data
            .into_iter()
            .map(|v| if !v.is_finite() || (v - fill).abs() < f32::EPSILON { f32::NAN } else { v })
            .collect();
        let volume = Volume::new(nz, ny, nx, data)?;

        Ok(LoadedGrid {
            time_utc: doc.time_utc,
            lead_minutes: doc.lead_minutes,
            variable: matched,
            volume,
            x_km: doc.x_km,
            y_km: doc.y_km,
            z_km: doc.z_km,
            projection: doc.projection,
        })
    }

    fn write(&self, path: &Path, doc: &GridDocument) -> Result<(), GridError> {
        let json = serde_json::to_vec(doc).map_err(|e| GridError::Encode(e.to_string()))?;
        let bytes = if self.compress {
            zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| GridError::Encode(e.to_string()))?
        } else {
            json
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GridError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, &bytes).map_err(|source| GridError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), size_bytes = bytes.len(), compressed = self.compress, "Grid document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::projection::ProjectionInfo;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn geometry(h: usize, w: usize) -> GridGeometry {
        GridGeometry::native(h, w, ProjectionInfo::new(-34.6, -68.0, 6_378_137.0))
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_values_survive_as_nan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.json");
        let grid = Grid2D::new(1, 3, vec![10.0, f32::NAN, 42.0]).unwrap();
        let doc = GridDocument::from_grid(ts(), "DBZ", "dBZ", &grid, &geometry(1, 3));

        let codec = JsonGridCodec::new(false);
        codec.write(&path, &doc).unwrap();
        let loaded = codec.read(&path, "DBZ").unwrap();
        let comp = loaded.volume.composite_max();
        assert!((comp.get(0, 0) - 10.0).abs() < f32::EPSILON);
        assert!(comp.get(0, 1).is_nan());
        assert_eq!(loaded.variable, VariableMatch::Configured("DBZ".into()));
    }

    #[test]
    fn test_compressed_documents_are_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.json");
        let grid = Grid2D::filled(4, 4, 33.0);
        let doc = GridDocument::from_grid(ts(), "DBZ", "dBZ", &grid, &geometry(4, 4));

        JsonGridCodec::new(true).write(&path, &doc).unwrap();
        let raw = fs::read(&path).unwrap();
        assert!(raw.starts_with(&ZSTD_MAGIC));

        // A non-compressing codec still reads it.
        let loaded = JsonGridCodec::new(false).read(&path, "DBZ").unwrap();
        assert_eq!(loaded.volume.height(), 4);
    }

    #[test]
    fn test_variable_fallback_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let grid = Grid2D::filled(2, 2, 20.0);
        let doc = GridDocument::from_grid(ts(), "dbz", "dBZ", &grid, &geometry(2, 2));
        let codec = JsonGridCodec::default();
        codec.write(&path, &doc).unwrap();

        let loaded = codec.read(&path, "reflectivity").unwrap();
        assert_eq!(loaded.variable, VariableMatch::Lowercase);
    }

    #[test]
    fn test_first_field_is_last_resort() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.json");
        let grid = Grid2D::filled(2, 2, 20.0);
        let doc = GridDocument::from_grid(ts(), "TH", "dBZ", &grid, &geometry(2, 2));
        let codec = JsonGridCodec::default();
        codec.write(&path, &doc).unwrap();

        let loaded = codec.read(&path, "DBZ").unwrap();
        assert_eq!(loaded.variable, VariableMatch::FirstField("TH".into()));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.json");
        fs::write(&path, b"not a grid").unwrap();
        assert!(matches!(
            JsonGridCodec::default().read(&path, "DBZ"),
            Err(GridError::Decode { .. })
        ));
    }

    #[test]
    fn test_volume_dims_squeezes_time() {
        assert_eq!(volume_dims(&[1, 3, 4, 5]).unwrap(), (3, 4, 5));
        assert_eq!(volume_dims(&[4, 5]).unwrap(), (1, 4, 5));
        assert!(volume_dims(&[4]).is_err());
    }
}
