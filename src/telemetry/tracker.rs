//! Aircraft tracker - latest position per callsign plus trails

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::info;

use super::parser::{AircraftPosition, PositionSource};

#[derive(Debug, Clone)]
struct Tracked {
    position: AircraftPosition,
    received_at: DateTime<Utc>,
}

/// Feed positions keyed by callsign, remote positions as last fetched,
/// trails keyed by registration.
///
/// A feed aircraft with no update for longer than the TTL is dropped. A
/// trail lives only while its registration is among the fresh aircraft.
pub struct AircraftTracker {
    ttl: Duration,
    max_trail_points: usize,
    positions: BTreeMap<String, Tracked>,
    remote: Vec<AircraftPosition>,
    trails: BTreeMap<String, VecDeque<[f64; 2]>>,
}

impl AircraftTracker {
    pub fn new(ttl_secs: i64, max_trail_points: usize) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            max_trail_points,
            positions: BTreeMap::new(),
            remote: Vec::new(),
            trails: BTreeMap::new(),
        }
    }

    pub fn update(&mut self, position: AircraftPosition, received_at: DateTime<Utc>) {
        self.extend_trail(&position);
        self.positions
            .insert(position.callsign.clone(), Tracked { position, received_at });
    }

    /// Replace the remote snapshot with a newer fetch.
    pub fn set_remote(&mut self, positions: Vec<AircraftPosition>) {
        self.remote = positions;
    }

    /// Drop stale feed aircraft and return the fresh ones merged with the
    /// remote snapshot. Trails of aircraft no longer present are dropped.
    pub fn fresh(&mut self, now: DateTime<Utc>) -> Vec<AircraftPosition> {
        let ttl = self.ttl;
        self.positions.retain(|callsign, tracked| {
            let keep = now - tracked.received_at <= ttl;
            if !keep {
                info!(callsign = %callsign, "Removed stale aircraft");
            }
            keep
        });

        let local = self.positions.values().map(|t| t.position.clone()).collect();
        let merged = merge_sources(local, &self.remote);
        for position in merged.iter().filter(|p| p.source != PositionSource::Feed) {
            self.extend_trail(position);
        }

        let live: BTreeSet<&str> = merged.iter().map(|p| p.registration.as_str()).collect();
        self.trails.retain(|registration, _| live.contains(registration.as_str()));
        merged
    }

    /// `[lon, lat]` points, oldest first.
    pub fn trail(&self, registration: &str) -> Vec<[f64; 2]> {
        self.trails
            .get(registration)
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }

    fn extend_trail(&mut self, position: &AircraftPosition) {
        let trail = self.trails.entry(position.registration.clone()).or_default();
        let point = [position.lon, position.lat];
        if trail.back() != Some(&point) {
            trail.push_back(point);
            while trail.len() > self.max_trail_points {
                trail.pop_front();
            }
        }
    }
}

/// Feed positions win: a remote aircraft whose registration the feed
/// already reports is left out.
pub fn merge_sources(local: Vec<AircraftPosition>, remote: &[AircraftPosition]) -> Vec<AircraftPosition> {
    let local_registrations: BTreeSet<String> = local.iter().map(|p| p.registration.clone()).collect();
    let mut merged = local;
    merged.extend(
        remote
            .iter()
            .filter(|p| !local_registrations.contains(&p.registration))
            .cloned(),
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap() + Duration::seconds(s)
    }

    fn pos(callsign: &str, lat: f64, lon: f64) -> AircraftPosition {
        AircraftPosition {
            callsign: callsign.to_string(),
            registration: format!("LV-{callsign}"),
            timestamp: t(0),
            lat,
            lon,
            altitude_m: 3000.0,
            ground_speed_mps: 70.0,
            heading_deg: 90.0,
            source: PositionSource::Feed,
            icao24: None,
        }
    }

    fn remote(callsign: &str, registration: &str, lat: f64, lon: f64) -> AircraftPosition {
        AircraftPosition {
            registration: registration.to_string(),
            source: PositionSource::OpenSky,
            icao24: Some("e020d2".to_string()),
            ..pos(callsign, lat, lon)
        }
    }

    #[test]
    fn test_ttl_drops_stale_aircraft() {
        let mut tracker = AircraftTracker::new(30, 70);
        tracker.update(pos("A", -34.6, -68.0), t(0));
        tracker.update(pos("B", -34.7, -68.1), t(20));
        assert_eq!(tracker.fresh(t(30)).len(), 2);
        let fresh = tracker.fresh(t(45));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].callsign, "B");
    }

    #[test]
    fn test_trail_appends_only_on_change_and_is_bounded() {
        let mut tracker = AircraftTracker::new(30, 3);
        tracker.update(pos("A", -34.6, -68.0), t(0));
        tracker.update(pos("A", -34.6, -68.0), t(1));
        assert_eq!(tracker.trail("LV-A"), vec![[-68.0, -34.6]]);

        for i in 1..=4 {
            tracker.update(pos("A", -34.6, -68.0 + f64::from(i)), t(i64::from(i)));
        }
        assert_eq!(tracker.trail("LV-A"), vec![[-66.0, -34.6], [-65.0, -34.6], [-64.0, -34.6]]);
        assert!(tracker.trail("LV-Z").is_empty());
    }

    #[test]
    fn test_expired_aircraft_lose_their_trail() {
        let mut tracker = AircraftTracker::new(30, 70);
        for i in 0..50 {
            let callsign = format!("X{i}");
            tracker.update(pos(&callsign, -34.6, -68.0), t(0));
        }
        tracker.update(pos("B", -34.7, -68.1), t(40));
        assert_eq!(tracker.fresh(t(50)).len(), 1);
        assert_eq!(tracker.trail_count(), 1);
        assert!(tracker.trail("LV-X0").is_empty());
        assert_eq!(tracker.trail("LV-B"), vec![[-68.1, -34.7]]);
    }

    #[test]
    fn test_merge_prefers_feed_by_registration() {
        let local = vec![pos("BCR", -34.6, -68.0)];
        let fetched = [
            remote("LVBCR", "LV-BCR", -34.9, -68.4),
            remote("LVBCT", "LV-BCT", -33.0, -68.0),
        ];
        let merged = merge_sources(local, &fetched);
        assert_eq!(merged.len(), 2);
        let bcr = merged.iter().find(|p| p.registration == "LV-BCR").unwrap();
        assert_eq!(bcr.source, PositionSource::Feed);
        assert!((bcr.lat + 34.6).abs() < 1e-9);
        let bct = merged.iter().find(|p| p.registration == "LV-BCT").unwrap();
        assert_eq!(bct.source, PositionSource::OpenSky);
    }

    #[test]
    fn test_remote_aircraft_tracked_until_next_fetch_drops_them() {
        let mut tracker = AircraftTracker::new(30, 70);
        tracker.set_remote(vec![remote("LVBCT", "LV-BCT", -33.0, -68.0)]);
        assert_eq!(tracker.fresh(t(0)).len(), 1);
        tracker.set_remote(vec![remote("LVBCT", "LV-BCT", -33.1, -68.0)]);
        assert_eq!(tracker.fresh(t(120)).len(), 1);
        assert_eq!(tracker.trail("LV-BCT"), vec![[-68.0, -33.0], [-68.0, -33.1]]);

        tracker.set_remote(Vec::new());
        assert!(tracker.fresh(t(135)).is_empty());
        assert_eq!(tracker.trail_count(), 0);
    }
}
