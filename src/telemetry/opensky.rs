//! OpenSky Network source - public ADS-B state vectors for the operations area
//!
//! Only aircraft named in `telemetry.opensky.aircraft` are kept. A state
//! matches by ICAO24 address first, then by a configured key contained in
//! its callsign (case-insensitive). Responses are reused for
//! `refresh_secs`; a failed fetch keeps the previous snapshot and is retried
//! on the next pass.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::parser::{AircraftPosition, PositionSource};

#[derive(Debug, Error)]
pub enum OpenSkyError {
    #[error("OpenSky request failed: {0}")]
    Http(String),

    #[error("OpenSky returned status {0}")]
    Status(u16),
}

#[cfg(feature = "opensky")]
impl From<reqwest::Error> for OpenSkyError {
    fn from(err: reqwest::Error) -> Self {
        OpenSkyError::Http(err.to_string())
    }
}

/// Body of `GET /states/all`.
#[derive(Debug, Deserialize)]
pub struct StatesResponse {
    #[serde(default)]
    pub time: Option<i64>,
    /// `null` when nothing is airborne in the box
    #[serde(default)]
    pub states: Option<Vec<Vec<Value>>>,
}

/// Configured identifiers, lowercased, in key order.
#[derive(Debug, Clone, Default)]
pub struct AircraftMatcher {
    entries: Vec<(String, String)>,
}

impl AircraftMatcher {
    pub fn new(aircraft: &BTreeMap<String, String>) -> Self {
        Self {
            entries: aircraft
                .iter()
                .map(|(key, registration)| (key.trim().to_lowercase(), registration.clone()))
                .filter(|(key, _)| !key.is_empty())
                .collect(),
        }
    }

    pub fn registration(&self, icao24: &str, callsign: &str) -> Option<&str> {
        let icao24 = icao24.trim().to_lowercase();
        let callsign = callsign.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| *key == icao24)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(key, _)| !callsign.is_empty() && callsign.contains(key.as_str()))
            })
            .map(|(_, registration)| registration.as_str())
    }
}

/// Tracked aircraft in a states response. States without a position are
/// skipped.
pub fn positions_from_states(
    response: &StatesResponse,
    matcher: &AircraftMatcher,
    fetched_at: DateTime<Utc>,
) -> Vec<AircraftPosition> {
    let Some(states) = &response.states else {
        return Vec::new();
    };
    let response_time = response.time.and_then(unix_time);

    states
        .iter()
        .filter_map(|state| {
            let icao24 = state.first().and_then(Value::as_str).unwrap_or_default();
            let callsign = state.get(1).and_then(Value::as_str).unwrap_or_default().trim();
            let registration = matcher.registration(icao24, callsign)?;
            let lon = number(state, 5)?;
            let lat = number(state, 6)?;

            let timestamp = state
                .get(3)
                .and_then(Value::as_i64)
                .or_else(|| state.get(4).and_then(Value::as_i64))
                .and_then(unix_time)
                .or(response_time)
                .unwrap_or(fetched_at);

            Some(AircraftPosition {
                callsign: if callsign.is_empty() { registration.to_string() } else { callsign.to_string() },
                registration: registration.to_string(),
                timestamp,
                lat,
                lon,
                altitude_m: number(state, 7).unwrap_or_default(),
                ground_speed_mps: number(state, 9).unwrap_or_default(),
                heading_deg: number(state, 10).unwrap_or_default(),
                source: PositionSource::OpenSky,
                icao24: Some(icao24.to_lowercase()),
            })
        })
        .collect()
}

fn number(state: &[Value], index: usize) -> Option<f64> {
    state.get(index).and_then(Value::as_f64)
}

fn unix_time(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

// ============================================================================
// Client
// ============================================================================

#[cfg(feature = "opensky")]
pub use client::OpenSkyClient;

#[cfg(feature = "opensky")]
mod client {
    use chrono::{DateTime, Duration, Utc};
    use tracing::{debug, warn};

    use super::{positions_from_states, AircraftMatcher, OpenSkyError, StatesResponse};
    use crate::config::OpenSkyConfig;
    use crate::telemetry::parser::AircraftPosition;

    pub struct OpenSkyClient {
        http: reqwest::Client,
        url: String,
        bbox: [(&'static str, f64); 4],
        matcher: AircraftMatcher,
        refresh: Duration,
        last_update: Option<DateTime<Utc>>,
    }

    impl OpenSkyClient {
        pub fn new(config: &OpenSkyConfig) -> Result<Self, OpenSkyError> {
            let http = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()?;
            Ok(Self {
                http,
                url: config.url.clone(),
                bbox: [
                    ("lamin", config.min_lat),
                    ("lomin", config.min_lon),
                    ("lamax", config.max_lat),
                    ("lomax", config.max_lon),
                ],
                matcher: AircraftMatcher::new(&config.aircraft),
                refresh: Duration::seconds(i64::try_from(config.refresh_secs).unwrap_or(i64::MAX)),
                last_update: None,
            })
        }

        /// A fresh snapshot when the cached one has expired, `None` while
        /// the cache is still valid or when the fetch failed.
        pub async fn poll(&mut self, now: DateTime<Utc>) -> Option<Vec<AircraftPosition>> {
            if self.last_update.is_some_and(|at| now - at < self.refresh) {
                return None;
            }
            match self.fetch(now).await {
                Ok(positions) => {
                    self.last_update = Some(now);
                    debug!(tracked = positions.len(), "OpenSky snapshot refreshed");
                    Some(positions)
                }
                Err(e) => {
                    warn!(error = %e, "OpenSky fetch failed, keeping previous snapshot");
                    None
                }
            }
        }

        async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<AircraftPosition>, OpenSkyError> {
            let resp = self.http.get(&self.url).query(&self.bbox).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OpenSkyError::Status(status.as_u16()));
            }
            let body: StatesResponse = resp.json().await?;
            Ok(positions_from_states(&body, &self.matcher, now))
        }
    }
}
