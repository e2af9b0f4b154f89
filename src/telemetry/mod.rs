//! Aircraft telemetry - positions from the daily feed against storm cells
//!
//! Runs as a secondary task of the main loop behind its own interval gate:
//!
//! 1. Read lines appended to today's `<dir>/<YYYYMMDD>.data`
//! 2. Update the tracker (latest position per callsign, trails), merged
//!    with the OpenSky snapshot when that source is attached
//! 3. Match every fresh aircraft to the nearest cell of the latest cycle
//! 4. Write `aircraft.json` for the web layer
//!
//! Nothing here fails an iteration; the caller logs the error and moves on.

pub mod opensky;
pub mod parser;
pub mod source;
pub mod tracker;

pub use opensky::{AircraftMatcher, OpenSkyError};
#[cfg(feature = "opensky")]
pub use opensky::OpenSkyClient;
pub use parser::{parse_line, AircraftPosition, ParseError, PositionSource};
pub use source::{feed_day, TelemetryFile};
pub use tracker::{merge_sources, AircraftTracker};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alerts::nearest_cell;
use crate::config::{FeedDateZone, TelemetryConfig};
use crate::types::{GeoPoint, StormCell};

/// Snapshot file name inside the output root.
pub const SNAPSHOT_FILE: &str = "aircraft.json";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry feed read failed: {0}")]
    Source(#[from] std::io::Error),

    #[error("failed to write {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One aircraft in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AircraftEntry {
    #[serde(flatten)]
    pub position: AircraftPosition,
    /// `[lon, lat]` points, oldest first
    pub trail: Vec<[f64; 2]>,
    pub nearest_cell_km: Option<f64>,
    pub within_alert_radius: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AircraftSnapshot {
    pub generated_at: DateTime<Utc>,
    pub aircraft: Vec<AircraftEntry>,
}

/// Outcome of one telemetry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySummary {
    pub lines_read: usize,
    pub rejected_lines: usize,
    pub tracked: usize,
    pub near_cells: usize,
}

pub struct TelemetryMonitor {
    source: TelemetryFile,
    file_date: FeedDateZone,
    tracker: AircraftTracker,
    callsigns: BTreeMap<String, String>,
    radius_km: f64,
    snapshot_path: PathBuf,
    #[cfg(feature = "opensky")]
    opensky: Option<OpenSkyClient>,
}

impl TelemetryMonitor {
    pub fn new(config: &TelemetryConfig, radius_km: f64, output_root: &Path) -> Self {
        Self {
            source: TelemetryFile::new(&config.directory),
            file_date: config.file_date,
            tracker: AircraftTracker::new(config.ttl_secs, config.max_trail_points),
            callsigns: config.callsigns.clone(),
            radius_km,
            snapshot_path: output_root.join(SNAPSHOT_FILE),
            #[cfg(feature = "opensky")]
            opensky: None,
        }
    }

    #[cfg(feature = "opensky")]
    pub fn with_opensky(mut self, client: OpenSkyClient) -> Self {
        self.opensky = Some(client);
        self
    }

    /// Poll the OpenSky source, if attached, ahead of a pass.
    #[cfg(feature = "opensky")]
    pub async fn refresh_remote(&mut self, now: DateTime<Utc>) {
        let Some(client) = self.opensky.as_mut() else {
            return;
        };
        if let Some(positions) = client.poll(now).await {
            self.tracker.set_remote(positions);
        }
    }

    /// Replace the remote positions merged into every pass.
    pub fn set_remote(&mut self, positions: Vec<AircraftPosition>) {
        self.tracker.set_remote(positions);
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Ingest new positions, check them against `cells`, write the snapshot.
    pub fn run(&mut self, cells: &[StormCell], now: DateTime<Utc>) -> Result<TelemetrySummary, TelemetryError> {
        let lines = self.source.read_new_lines(feed_day(self.file_date, now))?;
        let mut summary = TelemetrySummary {
            lines_read: lines.len(),
            ..Default::default()
        };

        for line in &lines {
            match parse_line(line, &self.callsigns) {
                Ok(Some(position)) => self.tracker.update(position, now),
                Ok(None) => {}
                Err(e) => {
                    summary.rejected_lines += 1;
                    warn!(line = %line, error = %e, "Rejected telemetry line");
                }
            }
        }

        let radius_km = self.radius_km;
        let fresh = self.tracker.fresh(now);
        let mut entries = Vec::with_capacity(fresh.len());
        for position in fresh {
            let nearest = nearest_cell(GeoPoint::new(position.lat, position.lon), cells);
            let within = nearest.is_some_and(|(d, _)| d < radius_km);
            if let Some((distance_km, cell)) = nearest.filter(|_| within) {
                summary.near_cells += 1;
                warn!(
                    registration = %position.registration,
                    distance_km = %format!("{distance_km:.1}"),
                    severity = %cell.severity,
                    max_dbz = cell.max_dbz,
                    "✈️ Aircraft near storm cell"
                );
            }
            entries.push(AircraftEntry {
                trail: self.tracker.trail(&position.registration),
                nearest_cell_km: nearest.map(|(d, _)| d),
                within_alert_radius: within,
                position,
            });
        }
        summary.tracked = entries.len();

        self.write_snapshot(&AircraftSnapshot {
            generated_at: now,
            aircraft: entries,
        })?;

        if summary.tracked > 0 || summary.lines_read > 0 {
            info!(
                lines = summary.lines_read,
                tracked = summary.tracked,
                near_cells = summary.near_cells,
                "🛩️ Telemetry pass"
            );
        } else {
            debug!("Telemetry pass: no aircraft");
        }
        Ok(summary)
    }

    fn write_snapshot(&self, snapshot: &AircraftSnapshot) -> Result<(), TelemetryError> {
        let path = &self.snapshot_path;
        let io = |source| TelemetryError::Snapshot {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeverityTier;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::tempdir;

    fn monitor(data: &Path, out: &Path) -> TelemetryMonitor {
        let config = TelemetryConfig {
            enabled: true,
            directory: data.to_path_buf(),
            file_date: FeedDateZone::Utc,
            callsigns: BTreeMap::from([("VBCR".to_string(), "LV-BCR".to_string())]),
            ..Default::default()
        };
        TelemetryMonitor::new(&config, 20.0, out)
    }

    fn cell() -> StormCell {
        StormCell {
            lat: -34.6,
            lon: -68.0,
            max_dbz: 60.0,
            severity: SeverityTier::ProbableHail,
            area_px: 40,
        }
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_pass_writes_snapshot_and_flags_nearby_aircraft() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 25, 17, 42, 30).unwrap();
        let mut m = monitor(data.path(), out.path());
        assert_eq!(m.run(&[cell()], now).unwrap(), TelemetrySummary::default());

        append(
            &data.path().join("20260125.data"),
            "# feed\n\
             VBCR,2026,01,25,17,42,05,-34.55,-68.0,12000,150,900\n\
             VBCT,2026,01,25,17,42,06,-33.0,-68.0,9000,120,1800\n\
             VBCU,2026,01,25,17,42,07,bad,-68.0,9000,120\n",
        );

        let summary = m.run(&[cell()], now).unwrap();
        assert_eq!(
            summary,
            TelemetrySummary {
                lines_read: 4,
                rejected_lines: 1,
                tracked: 2,
                near_cells: 1,
            }
        );

        let snapshot: AircraftSnapshot =
            serde_json::from_slice(&std::fs::read(m.snapshot_path()).unwrap()).unwrap();
        let bcr = snapshot
            .aircraft
            .iter()
            .find(|a| a.position.registration == "LV-BCR")
            .unwrap();
        assert!(bcr.within_alert_radius);
        assert_eq!(bcr.trail, vec![[-68.0, -34.55]]);
        let vbct = snapshot.aircraft.iter().find(|a| a.position.callsign == "VBCT").unwrap();
        assert!(!vbct.within_alert_radius);
        assert!(vbct.nearest_cell_km.unwrap() > 100.0);
    }

    #[test]
    fn test_positions_logged_before_startup_are_not_live() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        let feed = data.path().join("20260125.data");
        append(&feed, "VBCR,2026,01,25,08,00,00,-34.6,-68.0,12000,150,900\n");

        let mut m = monitor(data.path(), out.path());
        let evening = Utc.with_ymd_and_hms(2026, 1, 25, 17, 0, 0).unwrap();
        let summary = m.run(&[cell()], evening).unwrap();
        assert_eq!(summary.tracked, 0);
        assert_eq!(summary.near_cells, 0);

        append(&feed, "VBCR,2026,01,25,17,00,05,-34.6,-68.0,12000,150,900\n");
        let summary = m.run(&[cell()], evening + chrono::Duration::seconds(10)).unwrap();
        assert_eq!(summary.lines_read, 1);
        assert_eq!(summary.tracked, 1);
        assert_eq!(summary.near_cells, 1);
    }

    #[test]
    fn test_remote_positions_merge_without_duplicates() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 25, 17, 42, 30).unwrap();
        let mut m = monitor(data.path(), out.path());
        m.run(&[], now).unwrap();
        append(
            &data.path().join("20260125.data"),
            "VBCR,2026,01,25,17,42,05,-34.55,-68.0,12000,150,900\n",
        );

        let remote = |callsign: &str, registration: &str, lat: f64| AircraftPosition {
            callsign: callsign.to_string(),
            registration: registration.to_string(),
            timestamp: now,
            lat,
            lon: -68.0,
            altitude_m: 3000.0,
            ground_speed_mps: 70.0,
            heading_deg: 0.0,
            source: PositionSource::OpenSky,
            icao24: Some("e020d4".to_string()),
        };
        m.set_remote(vec![remote("LVBCR", "LV-BCR", -30.0), remote("LVBCT", "LV-BCT", -34.62)]);

        let summary = m.run(&[cell()], now).unwrap();
        assert_eq!(summary.tracked, 2);
        assert_eq!(summary.near_cells, 2);

        let snapshot: AircraftSnapshot =
            serde_json::from_slice(&std::fs::read(m.snapshot_path()).unwrap()).unwrap();
        let bcr = snapshot
            .aircraft
            .iter()
            .find(|a| a.position.registration == "LV-BCR")
            .unwrap();
        assert_eq!(bcr.position.source, PositionSource::Feed);
        let bct = snapshot
            .aircraft
            .iter()
            .find(|a| a.position.registration == "LV-BCT")
            .unwrap();
        assert_eq!(bct.position.source, PositionSource::OpenSky);
        assert_eq!(bct.trail, vec![[-68.0, -34.62]]);
    }

    #[test]
    fn test_no_feed_and_no_cells() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        let mut m = monitor(data.path(), out.path());
        let summary = m.run(&[], Utc::now()).unwrap();
        assert_eq!(summary, TelemetrySummary::default());
        assert!(m.snapshot_path().exists());
    }

    #[test]
    fn test_aircraft_expire_between_passes() {
        let data = tempdir().unwrap();
        let out = tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 25, 17, 42, 30).unwrap();
        let mut m = monitor(data.path(), out.path());
        m.run(&[], now).unwrap();
        append(
            &data.path().join("20260125.data"),
            "VBCR,2026,01,25,17,42,05,-34.55,-68.0,12000,150\n",
        );
        assert_eq!(m.run(&[], now).unwrap().tracked, 1);
        assert_eq!(m.run(&[], now + chrono::Duration::seconds(60)).unwrap().tracked, 0);
    }
}
