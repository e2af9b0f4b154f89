//! Storm cells and geographic points.

use serde::{Deserialize, Serialize};

/// WGS84-ish latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Severity class of a storm cell, by peak composite reflectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    /// Tier 1: peak at or below the severe threshold
    Storm,
    /// Tier 2: peak above the severe threshold
    SevereStorm,
    /// Tier 3: peak above the hail threshold
    ProbableHail,
}

impl SeverityTier {
    /// Classify a peak value. Both comparisons are strict.
    pub fn from_peak(peak_dbz: f32, severe_dbz: f32, hail_dbz: f32) -> Self {
        if peak_dbz > hail_dbz {
            SeverityTier::ProbableHail
        } else if peak_dbz > severe_dbz {
            SeverityTier::SevereStorm
        } else {
            SeverityTier::Storm
        }
    }

    pub const fn tier(self) -> u8 {
        match self {
            SeverityTier::Storm => 1,
            SeverityTier::SevereStorm => 2,
            SeverityTier::ProbableHail => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SeverityTier::Storm => "storm",
            SeverityTier::SevereStorm => "severe storm",
            SeverityTier::ProbableHail => "probable hail",
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{} {}", self.tier(), self.label())
    }
}

/// One connected region of the composite above the cell threshold.
///
/// Recomputed every cycle; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormCell {
    pub lat: f64,
    pub lon: f64,
    pub max_dbz: f32,
    #[serde(rename = "type")]
    pub severity: SeverityTier,
    /// Pixels in the component
    pub area_px: usize,
}

impl StormCell {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}
