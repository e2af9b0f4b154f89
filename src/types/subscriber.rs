//! Alert subscribers and their delivery endpoints.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GeoPoint;

/// A delivery endpoint owned by a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub endpoint: String,
    /// Opaque credentials forwarded to the notifier (e.g. auth headers)
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

/// An external entity that wants storm alerts near its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// Last alert time as stored by the registry. Kept as text because
    /// foreign writers may store anything here.
    #[serde(default)]
    pub last_alert: Option<String>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Outcome of reading a stored last-alert value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastAlert {
    Never,
    At(DateTime<Utc>),
    Unparseable,
}

/// Formats tried in order when the value is not RFC 3339 (assumed UTC).
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: None,
            last_alert: None,
            devices: Vec::new(),
        }
    }

    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.location = Some(GeoPoint::new(lat, lon));
        self
    }

    pub fn with_device(mut self, endpoint: impl Into<String>) -> Self {
        self.devices.push(Device {
            endpoint: endpoint.into(),
            credentials: BTreeMap::new(),
        });
        self
    }

    pub fn with_last_alert(mut self, at: DateTime<Utc>) -> Self {
        self.last_alert = Some(at.to_rfc3339());
        self
    }

    /// Parse the stored last-alert value.
    pub fn last_alert_at(&self) -> LastAlert {
        let Some(raw) = self.last_alert.as_deref().map(str::trim) else {
            return LastAlert::Never;
        };
        if raw.is_empty() {
            return LastAlert::Never;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return LastAlert::At(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map_or(LastAlert::Unparseable, |naive| LastAlert::At(naive.and_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_alert_strategies() {
        let at = Utc.with_ymd_and_hms(2026, 1, 25, 12, 0, 0).unwrap();
        let mut sub = Subscriber::new("u1").with_last_alert(at);
        assert_eq!(sub.last_alert_at(), LastAlert::At(at));

        sub.last_alert = Some("2026-01-25 12:00:00".into());
        assert_eq!(sub.last_alert_at(), LastAlert::At(at));

        sub.last_alert = Some("yesterday-ish".into());
        assert_eq!(sub.last_alert_at(), LastAlert::Unparseable);

        sub.last_alert = None;
        assert_eq!(sub.last_alert_at(), LastAlert::Never);
    }
}
