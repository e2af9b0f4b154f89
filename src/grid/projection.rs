//! Radar-centred azimuthal-equidistant projection and great-circle distance.
//!
//! Grid coordinates are kilometres east (`x`) and north (`y`) of the radar.

use serde::{Deserialize, Serialize};

use crate::config::defaults::{HAVERSINE_EARTH_RADIUS_KM, NATIVE_GRID_SPACING_KM};
use crate::types::GeoPoint;

/// Projection name written into grid documents.
pub const AEQD_NAME: &str = "azimuthal_equidistant";

/// Projection block stored alongside every grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionInfo {
    #[serde(default = "default_projection_name")]
    pub grid_mapping_name: String,
    pub origin_latitude: f64,
    pub origin_longitude: f64,
    pub earth_radius_m: f64,
    #[serde(default)]
    pub false_easting: f64,
    #[serde(default)]
    pub false_northing: f64,
}

fn default_projection_name() -> String {
    AEQD_NAME.to_string()
}

impl ProjectionInfo {
    pub fn new(origin_latitude: f64, origin_longitude: f64, earth_radius_m: f64) -> Self {
        Self {
            grid_mapping_name: default_projection_name(),
            origin_latitude,
            origin_longitude,
            earth_radius_m,
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }

    pub fn aeqd(&self) -> AzimuthalEquidistant {
        AzimuthalEquidistant {
            origin: GeoPoint::new(self.origin_latitude, self.origin_longitude),
            radius_m: self.earth_radius_m,
            false_easting: self.false_easting,
            false_northing: self.false_northing,
        }
    }
}

/// Spherical azimuthal-equidistant projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AzimuthalEquidistant {
    pub origin: GeoPoint,
    pub radius_m: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl AzimuthalEquidistant {
    /// Projected metres to latitude/longitude.
    pub fn inverse(&self, x_m: f64, y_m: f64) -> GeoPoint {
        let x = x_m - self.false_easting;
        let y = y_m - self.false_northing;
        let rho = x.hypot(y);
        if rho < 1e-9 {
            return self.origin;
        }
        let phi0 = self.origin.lat.to_radians();
        let lam0 = self.origin.lon.to_radians();
        let c = rho / self.radius_m;
        let (sin_c, cos_c) = c.sin_cos();

        let lat = (cos_c * phi0.sin() + y * sin_c * phi0.cos() / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = lam0
            + (x * sin_c).atan2(rho * phi0.cos() * cos_c - y * phi0.sin() * sin_c);

        GeoPoint::new(lat.to_degrees(), wrap_longitude(lon.to_degrees()))
    }

    /// Latitude/longitude to projected metres.
    pub fn forward(&self, point: GeoPoint) -> (f64, f64) {
        let phi0 = self.origin.lat.to_radians();
        let phi = point.lat.to_radians();
        let dlam = (point.lon - self.origin.lon).to_radians();

        let cos_c = (phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * dlam.cos()).clamp(-1.0, 1.0);
        let c = cos_c.acos();
        let k = if c.abs() < 1e-12 { 1.0 } else { c / c.sin() };

        let x = self.radius_m * k * phi.cos() * dlam.sin();
        let y = self.radius_m * k * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dlam.cos());
        (x + self.false_easting, y + self.false_northing)
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Great-circle distance in kilometres (mean Earth radius).
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * HAVERSINE_EARTH_RADIUS_KM * h.sqrt().clamp(0.0, 1.0).asin()
}

// ============================================================================
// Grid Geometry
// ============================================================================

/// Coordinate axes plus projection of one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub x_km: Vec<f32>,
    pub y_km: Vec<f32>,
    pub z_km: Vec<f32>,
    pub projection: ProjectionInfo,
}

impl GridGeometry {
    /// Radar-centred axes with uniform spacing: `-(n-1)/2 * d ..= (n-1)/2 * d`.
    pub fn centered(height: usize, width: usize, spacing_km: f32, projection: ProjectionInfo) -> Self {
        Self {
            x_km: centered_axis(width, spacing_km),
            y_km: centered_axis(height, spacing_km),
            z_km: vec![0.0],
            projection,
        }
    }

    /// Default 1 km geometry used when a document has no coordinates.
    pub fn native(height: usize, width: usize, projection: ProjectionInfo) -> Self {
        Self::centered(height, width, NATIVE_GRID_SPACING_KM, projection)
    }

    pub fn height(&self) -> usize {
        self.y_km.len()
    }

    pub fn width(&self) -> usize {
        self.x_km.len()
    }

    /// Geographic position of a pixel centre.
    pub fn pixel_to_geo(&self, row: usize, col: usize) -> GeoPoint {
        let x_m = f64::from(self.x_km[col]) * 1000.0;
        let y_m = f64::from(self.y_km[row]) * 1000.0;
        self.projection.aeqd().inverse(x_m, y_m)
    }

    /// `[[lat_min, lon_min], [lat_max, lon_max]]` over the grid's edges.
    pub fn bounds(&self) -> [[f64; 2]; 2] {
        let (h, w) = (self.height(), self.width());
        if h == 0 || w == 0 {
            let o = self.projection.aeqd().origin;
            return [[o.lat, o.lon], [o.lat, o.lon]];
        }
        let mut lat_min = f64::INFINITY;
        let mut lat_max = f64::NEG_INFINITY;
        let mut lon_min = f64::INFINITY;
        let mut lon_max = f64::NEG_INFINITY;
        let edge = (0..w)
            .flat_map(|c| [(0, c), (h - 1, c)])
            .chain((0..h).flat_map(|r| [(r, 0), (r, w - 1)]));
        for (r, c) in edge {
            let p = self.pixel_to_geo(r, c);
            lat_min = lat_min.min(p.lat);
            lat_max = lat_max.max(p.lat);
            lon_min = lon_min.min(p.lon);
            lon_max = lon_max.max(p.lon);
        }
        [[lat_min, lon_min], [lat_max, lon_max]]
    }
}

#[allow(clippy::cast_precision_loss)]
fn centered_axis(n: usize, spacing_km: f32) -> Vec<f32> {
    let start = -((n as f32 - 1.0) / 2.0) * spacing_km;
    (0..n).map(|i| start + i as f32 * spacing_km).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::{EARTH_RADIUS_M, SENSOR_LATITUDE, SENSOR_LONGITUDE};

    fn site() -> ProjectionInfo {
        ProjectionInfo::new(SENSOR_LATITUDE, SENSOR_LONGITUDE, EARTH_RADIUS_M)
    }

    #[test]
    fn test_inverse_at_origin() {
        let p = site().aeqd().inverse(0.0, 0.0);
        assert!((p.lat - SENSOR_LATITUDE).abs() < 1e-12);
        assert!((p.lon - SENSOR_LONGITUDE).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_north_is_north() {
        let aeqd = site().aeqd();
        let p = aeqd.inverse(0.0, 100_000.0);
        assert!(p.lat > SENSOR_LATITUDE);
        assert!((p.lon - SENSOR_LONGITUDE).abs() < 1e-9);
        // 100 km north along the meridian on the projection sphere.
        let expected = SENSOR_LATITUDE + (100_000.0 / EARTH_RADIUS_M).to_degrees();
        assert!((p.lat - expected).abs() < 1e-9);
    }

    #[test]
    fn test_forward_inverse_round_trip() {
        let aeqd = site().aeqd();
        for (x, y) in [(12_345.0, -67_890.0), (-200_000.0, 150_000.0), (1.0, 1.0)] {
            let p = aeqd.inverse(x, y);
            let (fx, fy) = aeqd.forward(p);
            assert!((fx - x).abs() < 1e-3, "x {x} -> {fx}");
            assert!((fy - y).abs() < 1e-3, "y {y} -> {fy}");
        }
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01);
        assert!(haversine_km(GeoPoint::new(-34.6, -68.0), GeoPoint::new(-34.6, -68.0)) < 1e-9);
    }

    #[test]
    fn test_native_axis_matches_radar_layout() {
        let g = GridGeometry::native(500, 500, site());
        assert!((g.x_km[0] + 249.5).abs() < 1e-4);
        assert!((g.x_km[499] - 249.5).abs() < 1e-4);
    }

    #[test]
    fn test_bounds_contain_origin() {
        let g = GridGeometry::native(20, 30, site());
        let [[lat_min, lon_min], [lat_max, lon_max]] = g.bounds();
        assert!(lat_min < SENSOR_LATITUDE && SENSOR_LATITUDE < lat_max);
        assert!(lon_min < SENSOR_LONGITUDE && SENSOR_LONGITUDE < lon_max);
    }
}
