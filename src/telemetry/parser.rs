//! Aircraft position line parser
//!
//! One position per line, comma separated:
//!
//! ```text
//! CALLSIGN,YYYY,MM,DD,hh,mm,ss,LAT,LON,ALT_FT,GS_KT[,HEADING_X10,...]
//! ```
//!
//! Lines starting with `#` and lines with fewer than 11 fields are not
//! positions and are skipped silently. Anything else that fails to parse is
//! an error for the caller to log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const MIN_FIELDS: usize = 11;
const FEET_TO_METRES: f64 = 0.3048;
const KNOTS_TO_MPS: f64 = 0.514_444;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("field {field} ({value:?}) is not a valid {expected}")]
    Field {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid date/time {0}")]
    Timestamp(String),
}

/// Where a position came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// The daily position files
    #[default]
    Feed,
    OpenSky,
}

/// One reported position, in SI units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftPosition {
    pub callsign: String,
    pub registration: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub ground_speed_mps: f64,
    pub heading_deg: f64,
    #[serde(default)]
    pub source: PositionSource,
    /// Transponder address, when the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icao24: Option<String>,
}

/// Parse one line. `Ok(None)` for comments, blanks and short lines.
pub fn parse_line(
    line: &str,
    callsigns: &BTreeMap<String, String>,
) -> Result<Option<AircraftPosition>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < MIN_FIELDS {
        return Ok(None);
    }

    let callsign = parts[0].to_string();
    let registration = callsigns.get(&callsign).cloned().unwrap_or_else(|| callsign.clone());

    let timestamp = parse_timestamp(&parts[1..7])?;
    let lat: f64 = field(parts[7], "lat", "number")?;
    let lon: f64 = field(parts[8], "lon", "number")?;
    let altitude_ft: i64 = field(parts[9], "altitude", "integer")?;
    let ground_speed_kt: i64 = field(parts[10], "ground_speed", "integer")?;
    let heading_x10: i64 = match parts.get(11) {
        Some(raw) => field(raw, "heading", "integer")?,
        None => 0,
    };

    #[allow(clippy::cast_precision_loss)]
    let position = AircraftPosition {
        callsign,
        registration,
        timestamp,
        lat,
        lon,
        altitude_m: (altitude_ft as f64 * FEET_TO_METRES).round(),
        ground_speed_mps: (ground_speed_kt as f64 * KNOTS_TO_MPS * 100.0).round() / 100.0,
        heading_deg: (heading_x10 as f64 / 10.0).round(),
        source: PositionSource::Feed,
        icao24: None,
    };
    Ok(Some(position))
}

fn field<T: std::str::FromStr>(raw: &str, name: &'static str, expected: &'static str) -> Result<T, ParseError> {
    raw.parse().map_err(|_| ParseError::Field {
        field: name,
        value: raw.to_string(),
        expected,
    })
}

fn parse_timestamp(parts: &[&str]) -> Result<DateTime<Utc>, ParseError> {
    let invalid = || ParseError::Timestamp(parts.join(","));
    let num = |i: usize| parts[i].parse::<u32>().map_err(|_| invalid());
    let year = parts[0].parse::<i32>().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, num(1)?, num(2)?).ok_or_else(invalid)?;
    let naive = date.and_hms_opt(num(3)?, num(4)?, num(5)?).ok_or_else(invalid)?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn map() -> BTreeMap<String, String> {
        BTreeMap::from([("VBCR".to_string(), "LV-BCR".to_string())])
    }

    #[test]
    fn test_full_line() {
        let pos = parse_line("VBCR,2026,01,25,17,42,05,-34.61,-68.33,12000,150,2705,extra", &map())
            .unwrap()
            .unwrap();
        assert_eq!(pos.callsign, "VBCR");
        assert_eq!(pos.registration, "LV-BCR");
        assert_eq!(pos.timestamp, Utc.with_ymd_and_hms(2026, 1, 25, 17, 42, 5).unwrap());
        assert!((pos.altitude_m - 3658.0).abs() < 1e-9);
        assert!((pos.ground_speed_mps - 77.17).abs() < 1e-9);
        assert!((pos.heading_deg - 271.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_callsign_and_missing_heading() {
        let pos = parse_line("XYZ1,2026,01,25,17,42,05,-34.6,-68.3,0,0", &map()).unwrap().unwrap();
        assert_eq!(pos.registration, "XYZ1");
        assert_eq!(pos.heading_deg, 0.0);
    }

    #[test]
    fn test_skipped_lines() {
        assert_eq!(parse_line("# header", &map()), Ok(None));
        assert_eq!(parse_line("   ", &map()), Ok(None));
        assert_eq!(parse_line("VBCR,2026,01,25", &map()), Ok(None));
    }

    #[test]
    fn test_bad_values_are_errors() {
        let err = parse_line("VBCR,2026,01,25,17,42,05,north,-68.3,0,0", &map()).unwrap_err();
        assert!(matches!(err, ParseError::Field { field: "lat", .. }));
        let err = parse_line("VBCR,2026,02,30,17,42,05,-34.6,-68.3,0,0", &map()).unwrap_err();
        assert!(matches!(err, ParseError::Timestamp(_)));
    }
}
